use crate::errors::RuleCompilationError;

/// Maximum accepted rule expression size in bytes.
pub const MAX_EXPRESSION_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(String),
    Text(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Eof,
}

impl Token {
    /// Source-like rendering used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => name.clone(),
            Token::Number(raw) => raw.clone(),
            Token::Text(text) => format!("'{text}'"),
            Token::True => "TRUE".to_string(),
            Token::False => "FALSE".to_string(),
            Token::Null => "NULL".to_string(),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::Not => "NOT".to_string(),
            Token::Eq => "==".to_string(),
            Token::Ne => "!=".to_string(),
            Token::Lt => "<".to_string(),
            Token::Gt => ">".to_string(),
            Token::Le => "<=".to_string(),
            Token::Ge => ">=".to_string(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// Token paired with its byte offset in the expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub position: usize,
}

/// Split a rule expression into tokens, ending with [`Token::Eof`].
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, RuleCompilationError> {
    if input.len() > MAX_EXPRESSION_BYTES {
        return Err(RuleCompilationError::TooLarge {
            max: MAX_EXPRESSION_BYTES,
            actual: input.len(),
        });
    }

    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let start = offset;
        let ch = bytes[offset];
        let token = match ch {
            b' ' | b'\t' | b'\n' | b'\r' => {
                offset += 1;
                continue;
            }
            b'(' => single(&mut offset, Token::LParen),
            b')' => single(&mut offset, Token::RParen),
            b',' => single(&mut offset, Token::Comma),
            b'+' => single(&mut offset, Token::Plus),
            b'-' => single(&mut offset, Token::Minus),
            b'*' => single(&mut offset, Token::Star),
            b'/' => single(&mut offset, Token::Slash),
            b'=' => {
                if bytes.get(offset + 1) == Some(&b'=') {
                    offset += 2;
                    Token::Eq
                } else {
                    return Err(RuleCompilationError::UnexpectedToken {
                        expected: "`==` for equality",
                        found: "=".to_string(),
                        position: start,
                    });
                }
            }
            b'!' => {
                if bytes.get(offset + 1) == Some(&b'=') {
                    offset += 2;
                    Token::Ne
                } else {
                    return Err(RuleCompilationError::UnexpectedToken {
                        expected: "`!=` or the NOT keyword",
                        found: "!".to_string(),
                        position: start,
                    });
                }
            }
            b'<' => {
                if bytes.get(offset + 1) == Some(&b'=') {
                    offset += 2;
                    Token::Le
                } else {
                    single(&mut offset, Token::Lt)
                }
            }
            b'>' => {
                if bytes.get(offset + 1) == Some(&b'=') {
                    offset += 2;
                    Token::Ge
                } else {
                    single(&mut offset, Token::Gt)
                }
            }
            b'\'' | b'"' => {
                let (text, end) = string_literal(input, offset)?;
                offset = end;
                Token::Text(text)
            }
            b'0'..=b'9' | b'.' => {
                consume_while(bytes, &mut offset, |b| b.is_ascii_digit() || b == b'.');
                let raw = &input[start..offset];
                if raw.matches('.').count() > 1 || raw == "." {
                    return Err(RuleCompilationError::InvalidNumber {
                        raw: raw.to_string(),
                        position: start,
                    });
                }
                Token::Number(raw.to_string())
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                consume_while(bytes, &mut offset, |b| {
                    b.is_ascii_alphanumeric() || b == b'_'
                });
                keyword_or_ident(&input[start..offset])
            }
            _ => {
                let found = input[start..].chars().next().unwrap_or('?').to_string();
                return Err(RuleCompilationError::UnexpectedToken {
                    expected: "field, literal, function or operator",
                    found,
                    position: start,
                });
            }
        };
        tokens.push(SpannedToken {
            token,
            position: start,
        });
    }

    if tokens.is_empty() {
        return Err(RuleCompilationError::EmptyExpression);
    }

    tokens.push(SpannedToken {
        token: Token::Eof,
        position: offset,
    });
    Ok(tokens)
}

fn single(offset: &mut usize, token: Token) -> Token {
    *offset += 1;
    token
}

fn consume_while(bytes: &[u8], offset: &mut usize, condition: impl Fn(u8) -> bool) {
    while let Some(&b) = bytes.get(*offset) {
        if !condition(b) {
            break;
        }
        *offset += 1;
    }
}

/// Read a quoted literal starting at `start`; backslash escapes the next character.
fn string_literal(input: &str, start: usize) -> Result<(String, usize), RuleCompilationError> {
    let mut chars = input[start..].char_indices();
    let quote = match chars.next() {
        Some((_, quote)) => quote,
        None => return Err(RuleCompilationError::UnterminatedString { position: start }),
    };

    let mut text = String::new();
    let mut escaped = false;
    for (idx, ch) in chars {
        if escaped {
            text.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return Ok((text, start + idx + ch.len_utf8()));
        } else {
            text.push(ch);
        }
    }

    Err(RuleCompilationError::UnterminatedString { position: start })
}

fn keyword_or_ident(slice: &str) -> Token {
    match slice.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "NULL" => Token::Null,
        _ => Token::Ident(slice.to_ascii_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .expect("tokenize")
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("qty >= 1 and Not flag OR TRUE"),
            vec![
                Token::Ident("qty".to_string()),
                Token::Ge,
                Token::Number("1".to_string()),
                Token::And,
                Token::Not,
                Token::Ident("flag".to_string()),
                Token::Or,
                Token::True,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn string_literals_accept_both_quotes_and_escapes() {
        assert_eq!(
            kinds(r#"startswith(id, 'TXN-') == "it\"s""#)[4],
            Token::Text("TXN-".to_string())
        );
        assert_eq!(
            kinds(r#""it\"s""#)[0],
            Token::Text("it\"s".to_string())
        );
    }

    #[test]
    fn rejects_single_equals_and_unterminated_strings() {
        assert!(matches!(
            tokenize("amount = 5"),
            Err(RuleCompilationError::UnexpectedToken { position: 7, .. })
        ));
        assert_eq!(
            tokenize("name == 'abc"),
            Err(RuleCompilationError::UnterminatedString { position: 8 })
        );
        assert_eq!(tokenize("   "), Err(RuleCompilationError::EmptyExpression));
    }
}
