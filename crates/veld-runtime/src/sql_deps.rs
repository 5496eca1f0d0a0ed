//! Object-reference extraction from model SQL.
//!
//! Reconciliation needs to know which catalog objects a model reads from,
//! not the full statement semantics, so this is a reference scanner rather
//! than a SQL parser: it tokenizes just enough to find the object names
//! following `FROM` and `JOIN`, skipping string literals, comments,
//! sub-selects, and table functions.

/// A lexed token: either a word (identifier/keyword) or a single symbol.
#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Symbol(char),
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn lex(sql: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            // Line comment.
            '-' => {
                chars.next();
                if chars.peek() == Some(&'-') {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                } else {
                    tokens.push(Token::Symbol('-'));
                }
            }
            // Block comment.
            '/' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    let mut prev = ' ';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        prev = c;
                    }
                } else {
                    tokens.push(Token::Symbol('/'));
                }
            }
            // String literal: opaque to reference scanning.
            '\'' => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\'' {
                        // Doubled quote is an escaped quote.
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            // Quoted identifier.
            '"' => {
                chars.next();
                let mut ident = String::new();
                while let Some(c) = chars.next() {
                    if c == '"' {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            ident.push('"');
                        } else {
                            break;
                        }
                    } else {
                        ident.push(c);
                    }
                }
                tokens.push(Token::Word(ident));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            c if is_ident_char(c) => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if is_ident_char(c) {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            c => {
                chars.next();
                tokens.push(Token::Symbol(c));
            }
        }
    }
    tokens
}

/// Extracts the object names a SQL statement reads from.
///
/// Returns names in first-reference order, de-duplicated
/// case-insensitively. Sub-selects (`FROM (...)`) and table functions
/// (`FROM read_csv('...')`) are not references.
#[must_use]
pub fn extract_references(sql: &str) -> Vec<String> {
    let tokens = lex(sql);
    let mut refs: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let is_source_keyword = matches!(
            &tokens[i],
            Token::Word(w) if w.eq_ignore_ascii_case("from") || w.eq_ignore_ascii_case("join")
        );
        if is_source_keyword {
            if let Some(Token::Word(name)) = tokens.get(i + 1) {
                // A word followed by '(' is a table function, not a table.
                let is_function = matches!(tokens.get(i + 2), Some(Token::Symbol('(')));
                if !is_function && !name.is_empty() {
                    let lower = name.to_lowercase();
                    if !seen.contains(&lower) {
                        seen.push(lower);
                        refs.push(name.clone());
                    }
                }
            }
        }
        i += 1;
    }
    refs
}
