use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use text2sql_core::{AppConfig, ChatClient, Pipeline};

const PROMPT: &str = "请输入您的查询 (或 'exit' 退出): ";
const FAREWELL: &str = "谢谢使用，再见！";

#[derive(Parser, Debug)]
#[command(name = "text2sql")]
#[command(version)]
#[command(about = "Ask questions about a small database in Chinese", long_about = None)]
struct Cli {
    /// TOML configuration file; replaces the built-in preset
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Built-in schema preset (employees, vehicles, company)
    #[arg(short = 'p', long = "preset", default_value = "employees")]
    preset: String,

    /// Chat-completions endpoint URL
    #[arg(long = "endpoint")]
    endpoint: Option<String>,

    /// Model name sent with each request
    #[arg(long = "model")]
    model: Option<String>,

    /// Answer one question and exit
    #[arg(short = 'e', long = "execute", value_name = "QUESTION")]
    execute: Option<String>,

    /// Enable debug logging on stderr
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => AppConfig::preset(&self.preset)?,
        };
        if let Some(endpoint) = &self.endpoint {
            config.llm.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = cli.load_config()?;
    let client = ChatClient::from_config(&config.llm);
    log::info!("using model {} at {}", client.model(), client.endpoint());

    let pipeline = Pipeline::new(&config, Box::new(client))?;

    if let Some(question) = &cli.execute {
        println!("{}", pipeline.process(question));
        pipeline.shutdown();
        return Ok(());
    }

    println!("欢迎使用text to SQL系统！");
    println!("当前数据集: {}", config.schema.name);
    println!("输入 'exit' 或 'quit' 退出程序。");
    println!("以 'SQL ' 开头的输入将作为SQL语句直接执行。");
    println!("本系统支持复杂查询，如比较、排序和聚合函数。\n");

    let stdin = io::stdin();
    let stdout = io::stdout();
    run_loop(&pipeline, stdin.lock(), stdout.lock())?;

    pipeline.shutdown();
    Ok(())
}

/// Reads questions until `exit`, `quit` or end of input.
fn run_loop(pipeline: &Pipeline, mut input: impl BufRead, mut output: impl Write) -> io::Result<()> {
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            writeln!(output, "{}", FAREWELL)?;
            return Ok(());
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            writeln!(output, "{}", FAREWELL)?;
            return Ok(());
        }

        let report = match raw_sql(line) {
            Some(sql) => pipeline.process_sql(sql),
            None => pipeline.process(line),
        };
        writeln!(output, "{}\n", report)?;
    }
}

/// `SQL <statement>` bypasses the language model.
fn raw_sql(line: &str) -> Option<&str> {
    let prefix = line.get(..4)?;
    if prefix.eq_ignore_ascii_case("SQL ") {
        Some(line[4..].trim())
    } else {
        None
    }
}
