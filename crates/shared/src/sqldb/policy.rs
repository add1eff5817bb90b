use std::fmt;
use std::str::FromStr;

const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];

/// Decides which generated statements may reach the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementPolicy {
    #[default]
    AllowAll,
    ReadOnly,
}

impl StatementPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllowAll => "allow_all",
            Self::ReadOnly => "read_only",
        }
    }

    /// Returns the rejection reason when `sql` is not permitted. The text itself is never
    /// rewritten.
    pub fn check(&self, sql: &str) -> Result<(), String> {
        match self {
            Self::AllowAll => Ok(()),
            Self::ReadOnly => check_read_only(sql),
        }
    }
}

impl fmt::Display for StatementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow_all" | "allow-all" => Ok(Self::AllowAll),
            "read_only" | "read-only" => Ok(Self::ReadOnly),
            other => Err(format!(
                "SQL_STATEMENT_POLICY must be allow_all or read_only, got '{other}'"
            )),
        }
    }
}

fn check_read_only(sql: &str) -> Result<(), String> {
    let keyword = sql
        .trim_start()
        .split(|ch: char| !ch.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    if !READ_ONLY_KEYWORDS.contains(&keyword.as_str()) {
        return Err(if keyword.is_empty() {
            "statement does not start with a keyword".to_string()
        } else {
            format!("{keyword} statements are not allowed in read-only mode")
        });
    }

    if statement_count(sql)? > 1 {
        return Err("multiple statements are not allowed in read-only mode".to_string());
    }

    Ok(())
}

/// Counts `;`-separated statements outside of quoted text, ignoring a trailing terminator.
/// Comment markers and backslash escapes are rejected outright; MySQL and SQLite read them
/// differently.
fn statement_count(sql: &str) -> Result<usize, String> {
    let mut chars = sql.chars().peekable();
    let mut closing_quote: Option<char> = None;
    let mut count = 1;
    let mut pending_terminator = false;

    while let Some(ch) = chars.next() {
        if let Some(close) = closing_quote {
            if ch == '\\' {
                return Err("backslash escapes are not allowed in read-only mode".to_string());
            }
            if ch == close {
                closing_quote = None;
            }
            continue;
        }

        let starts_comment = match ch {
            '#' => true,
            '-' => chars.peek() == Some(&'-'),
            '/' => chars.peek() == Some(&'*'),
            _ => false,
        };
        if starts_comment {
            return Err("comments are not allowed in read-only mode".to_string());
        }

        if ch == ';' {
            pending_terminator = true;
            continue;
        }
        if ch.is_whitespace() {
            continue;
        }
        if pending_terminator {
            count += 1;
            pending_terminator = false;
        }
        closing_quote = match ch {
            '\'' | '"' | '`' => Some(ch),
            '[' => Some(']'),
            _ => None,
        };
    }

    Ok(count)
}
