//! Cleanup of model completions before they reach the store.

const FENCE: &str = "```";
const SQL_FENCE: &str = "```sql";

/// Strips a surrounding markdown code fence (```` ```sql ```` or a bare
/// ```` ``` ````) and the whitespace around it. Fence pairs are peeled until
/// none remain at either end, so the result is stable under reapplication.
pub fn sanitize(raw: &str) -> String {
    let mut current = raw.trim();
    loop {
        let next = strip_fences(current);
        if next == current {
            return current.to_string();
        }
        current = next;
    }
}

fn strip_fences(text: &str) -> &str {
    let text = text
        .strip_prefix(SQL_FENCE)
        .or_else(|| text.strip_prefix(FENCE))
        .unwrap_or(text)
        .trim_start();
    text.strip_suffix(FENCE).unwrap_or(text).trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_sql_fence() {
        assert_eq!(sanitize("```sql\nSELECT * FROM t\n```"), "SELECT * FROM t");
    }

    #[test]
    fn test_strips_bare_fence_and_whitespace() {
        assert_eq!(
            sanitize("  \n```\nSELECT name FROM employees\n```  \n"),
            "SELECT name FROM employees"
        );
    }

    #[test]
    fn test_plain_sql_unchanged() {
        let sql = "SELECT id FROM employees WHERE salary > 70000";
        assert_eq!(sanitize(sql), sql);
    }

    #[test]
    fn test_sql_tag_is_case_sensitive() {
        // An upper-case tag is not a language marker; only the backticks go.
        assert_eq!(sanitize("```SQL\nSELECT 1\n```"), "SQL\nSELECT 1");
    }

    #[test]
    fn test_internal_content_preserved() {
        let raw = "```sql\nSELECT '```' AS fence FROM t\n```";
        assert_eq!(sanitize(raw), "SELECT '```' AS fence FROM t");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "```sql\nSELECT * FROM t\n```",
            "```sql\n```sql\nSELECT 1\n```\n```",
            "   SELECT 1   ",
            "```",
            "",
            "```sql SELECT a FROM b```",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {:?}", input);
        }
    }
}
