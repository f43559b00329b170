use thiserror::Error;

const QUOTE: char = '"';
const SEPARATOR: char = ' ';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    #[error("unterminated quote starting at offset {offset}")]
    Unterminated { offset: usize },
    #[error("unexpected character after closing quote at offset {offset}")]
    TrailingCharacter { offset: usize },
    #[error("bare quote inside unquoted event at offset {offset}")]
    BareQuote { offset: usize },
}

/// Splits an `Event` cell such as `'Presence detected' 'Config Error'` into
/// its event names.
///
/// Single quotes are treated like double quotes, a doubled quote inside a
/// quoted event is a literal quote, and every space separates two events
/// (so consecutive spaces yield empty events).
pub fn decode_events(field: &str) -> Result<Vec<String>, EventDecodeError> {
    let normalized = field.replace('\'', "\"");
    if normalized.is_empty() {
        return Ok(Vec::new());
    }

    let mut tokens = Vec::new();
    let mut chars = normalized.char_indices().peekable();

    loop {
        let mut token = String::new();

        if let Some(&(start, QUOTE)) = chars.peek() {
            chars.next();
            loop {
                match chars.next() {
                    Some((_, QUOTE)) => match chars.peek() {
                        Some(&(_, QUOTE)) => {
                            chars.next();
                            token.push(QUOTE);
                        }
                        Some(&(_, SEPARATOR)) | None => break,
                        Some(&(offset, _)) => {
                            return Err(EventDecodeError::TrailingCharacter { offset })
                        }
                    },
                    Some((_, c)) => token.push(c),
                    None => return Err(EventDecodeError::Unterminated { offset: start }),
                }
            }
        } else {
            while let Some(&(offset, c)) = chars.peek() {
                match c {
                    SEPARATOR => break,
                    QUOTE => return Err(EventDecodeError::BareQuote { offset }),
                    _ => {
                        token.push(c);
                        chars.next();
                    }
                }
            }
        }

        tokens.push(token);

        // Either a separator or the end of the field follows every token.
        if chars.next().is_none() {
            return Ok(tokens);
        }
    }
}
