//! Validator (C10): syntactic/semantic checks on the query string and on
//! the token stream produced by the tokenizer.

use super::tokenizer::Token;
use crate::error::QueryError;

const MAX_QUERY_LENGTH: usize = 1000;
const MAX_NESTING_DEPTH: i32 = 10;

/// Pre-parse check on the raw string.
pub fn validate_query_string(input: &str) -> Result<(), QueryError> {
    if input.trim().is_empty() {
        return Err(QueryError::Empty);
    }
    if input.chars().count() > MAX_QUERY_LENGTH {
        return Err(QueryError::Syntax("query exceeds maximum length".to_string()));
    }
    if input.chars().any(|c| c.is_control() && c != '\t') {
        return Err(QueryError::Syntax("query contains invalid characters".to_string()));
    }
    Ok(())
}

fn is_operand_token(t: &Token) -> bool {
    matches!(t, Token::Term(_) | Token::Quoted(_) | Token::KeyValue(_))
}

/// Post-tokenization check: balanced parens, well-formed binary/unary
/// operator neighborhoods, bounded nesting depth.
pub fn validate_tokens(tokens: &[Token]) -> Result<(), QueryError> {
    let mut depth = 0i32;
    let mut max_depth = 0i32;
    for t in tokens {
        match t {
            Token::OpenParen => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            Token::CloseParen => {
                depth -= 1;
                if depth < 0 {
                    return Err(QueryError::UnbalancedParentheses);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(QueryError::UnbalancedParentheses);
    }
    if max_depth > MAX_NESTING_DEPTH {
        return Err(QueryError::ExpressionTooComplex);
    }

    for (i, t) in tokens.iter().enumerate() {
        match t {
            Token::And | Token::Or => {
                let left_ok = i > 0
                    && (is_operand_token(&tokens[i - 1]) || tokens[i - 1] == Token::CloseParen);
                let right_ok = i + 1 < tokens.len()
                    && (is_operand_token(&tokens[i + 1])
                        || tokens[i + 1] == Token::Not
                        || tokens[i + 1] == Token::OpenParen);
                if !left_ok || !right_ok {
                    return Err(QueryError::MissingOperand);
                }
            }
            Token::Not => {
                let right_ok = i + 1 < tokens.len()
                    && (is_operand_token(&tokens[i + 1]) || tokens[i + 1] == Token::OpenParen);
                if !right_ok {
                    return Err(QueryError::MissingOperand);
                }
            }
            _ => {}
        }
    }
    Ok(())
}
