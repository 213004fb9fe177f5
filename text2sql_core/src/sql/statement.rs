/// A flat, upper-cased, whitespace-delimited view of a SQL string.
///
/// This is not a parse tree. Clause boundaries are found by scanning for the
/// first token equal to a keyword, so a keyword repeated inside a literal is
/// matched at its first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    tokens: Vec<String>,
}

impl SqlStatement {
    pub fn tokenize(sql: &str) -> Self {
        let body = sql.trim().trim_end_matches(';');
        let tokens = body
            .to_uppercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Self { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.position(keyword).is_some()
    }

    /// Index of the first token equal to `keyword`.
    pub fn position(&self, keyword: &str) -> Option<usize> {
        self.tokens.iter().position(|t| t == keyword)
    }

    /// Index of the first `first` token, provided the token right after it is `second`.
    pub fn pair_position(&self, first: &str, second: &str) -> Option<usize> {
        let idx = self.position(first)?;
        match self.tokens.get(idx + 1) {
            Some(next) if next == second => Some(idx),
            _ => None,
        }
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.tokens.get(idx).map(String::as_str)
    }

    /// Tokens in `start..end`, clamped to the stream.
    pub fn slice(&self, start: usize, end: usize) -> &[String] {
        let end = end.min(self.tokens.len());
        let start = start.min(end);
        &self.tokens[start..end]
    }

    /// Tokens from `start` to the end of the stream.
    pub fn tail(&self, start: usize) -> &[String] {
        self.slice(start, self.tokens.len())
    }
}
