//! Statement checks applied before SQL reaches the server.
//!
//! [`ensure_single_statement`] always runs: the MySQL driver enables
//! multi-statement batches, so stacked replies must be stopped here.
//! [`ensure_read_only`] runs when `database.read_only` is set. Neither is a
//! SQL parser. The read-only check rejects some harmless queries (a string
//! literal containing `delete`, for example).

use crate::db::QueryError;
use regex::Regex;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::LazyLock;

static READ_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(select|with|show|describe|desc|explain)\b").unwrap()
});

static WRITE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|replace|merge|drop|alter|create|truncate|rename|grant|revoke|call|load|handler|lock|unlock|set|outfile|dumpfile)\b",
    )
    .unwrap()
});

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Rejects text holding more than one statement. Semicolons inside quotes,
/// backticks and comments do not count, and one trailing `;` is allowed.
pub fn ensure_single_statement(sql: &str) -> Result<(), QueryError> {
    let mut state = Scan::Code;
    let mut terminated = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Scan::Quoted(quote) => {
                if c == '\\' && quote != '`' {
                    chars.next();
                } else if c == quote {
                    // a doubled quote stays inside the literal
                    if chars.peek() == Some(&quote) {
                        chars.next();
                    } else {
                        state = Scan::Code;
                    }
                }
            }
            Scan::LineComment => {
                if c == '\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = Scan::Code;
                }
            }
            Scan::Code => match c {
                '\'' | '"' | '`' => {
                    if terminated {
                        return Err(stacked());
                    }
                    state = Scan::Quoted(c);
                }
                '#' => state = Scan::LineComment,
                // `--` only opens a comment when followed by whitespace
                '-' if starts_line_comment(&chars) => {
                    chars.next();
                    state = Scan::LineComment;
                }
                // `/*! ... */` is executed by MySQL, so it is scanned as code
                '/' if starts_block_comment(&chars) => {
                    chars.next();
                    state = Scan::BlockComment;
                }
                ';' => {
                    if terminated {
                        return Err(stacked());
                    }
                    terminated = true;
                }
                c if c.is_whitespace() => {}
                _ => {
                    if terminated {
                        return Err(stacked());
                    }
                }
            },
        }
    }

    Ok(())
}

fn starts_line_comment(rest: &Peekable<Chars<'_>>) -> bool {
    let mut ahead = rest.clone();
    ahead.next() == Some('-') && ahead.next().is_none_or(char::is_whitespace)
}

fn starts_block_comment(rest: &Peekable<Chars<'_>>) -> bool {
    let mut ahead = rest.clone();
    ahead.next() == Some('*') && ahead.next() != Some('!')
}

fn stacked() -> QueryError {
    QueryError::Rejected("multiple statements are not allowed".to_string())
}

pub fn ensure_read_only(sql: &str) -> Result<(), QueryError> {
    ensure_single_statement(sql)?;
    let statement = sql.trim().trim_end_matches(';').trim_end();

    if statement.is_empty() {
        return Err(QueryError::Rejected("empty statement".to_string()));
    }
    if !READ_PREFIX.is_match(statement) {
        return Err(QueryError::Rejected(
            "only read-only statements are allowed".to_string(),
        ));
    }
    if let Some(keyword) = WRITE_KEYWORD.find(statement) {
        return Err(QueryError::Rejected(format!(
            "write keyword `{}` is not allowed",
            keyword.as_str()
        )));
    }

    Ok(())
}
