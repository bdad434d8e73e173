//! Parser (C11): builds an expression tree with precedence, including
//! implicit-AND insertion and the simple-query fast path.

use super::planner::is_recognized_key;
use super::tokenizer::{tokenize, Token};
use super::validator::{validate_query_string, validate_tokens};
use crate::error::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Raw term text, already shaped by the parser (quotes kept for exact
    /// match, wildcard chars kept verbatim, trailing `*` appended for an
    /// implicit prefix match).
    Term(String),
    KeyValue(String, String),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
}

pub fn parse(query: &str) -> Result<Expression, QueryError> {
    validate_query_string(query)?;
    let tokens = tokenize(query)?;
    validate_tokens(&tokens)?;

    if is_simple_query(&tokens) {
        return Ok(parse_simple(&tokens));
    }

    let with_and = insert_implicit_and(&tokens);
    let mut pos = 0usize;
    let expr = parse_or(&with_and, &mut pos)?;
    if pos != with_and.len() {
        return Err(QueryError::Syntax("trailing tokens after expression".to_string()));
    }
    Ok(expr)
}

fn is_simple_query(tokens: &[Token]) -> bool {
    !tokens
        .iter()
        .any(|t| matches!(t, Token::And | Token::Or | Token::Not | Token::OpenParen | Token::CloseParen))
}

fn parse_simple(tokens: &[Token]) -> Expression {
    if tokens.len() == 1 {
        return token_to_simple_expression(&tokens[0]);
    }
    Expression::And(
        tokens
            .iter()
            .map(|t| match t {
                Token::KeyValue(kv) => key_value_expression(kv),
                _ => Expression::Term(token_text(t)),
            })
            .collect(),
    )
}

fn token_to_simple_expression(token: &Token) -> Expression {
    match token {
        Token::Quoted(q) => Expression::Term(q.clone()),
        Token::Term(t) => {
            if t.contains('*') || t.contains('?') {
                Expression::Term(t.clone())
            } else {
                Expression::Term(format!("{}*", t))
            }
        }
        Token::KeyValue(kv) => key_value_expression(kv),
        _ => Expression::Term(token_text(token)),
    }
}

fn token_text(token: &Token) -> String {
    match token {
        Token::Term(t) => t.clone(),
        Token::Quoted(q) => q.clone(),
        Token::KeyValue(kv) => kv.clone(),
        Token::And => "&".to_string(),
        Token::Or => "|".to_string(),
        Token::Not => "!".to_string(),
        Token::OpenParen => "(".to_string(),
        Token::CloseParen => ")".to_string(),
    }
}

fn key_value_expression(raw: &str) -> Expression {
    match split_key_value(raw) {
        Some((key, value)) if is_recognized_key(&key) => Expression::KeyValue(key, value),
        _ => Expression::Term(raw.to_string()),
    }
}

fn split_key_value(raw: &str) -> Option<(String, String)> {
    let idx = raw.find(':')?;
    let key = raw[..idx].to_ascii_lowercase();
    let mut value = raw[idx + 1..].to_string();
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        value = value[1..value.len() - 1].to_string();
    }
    Some((key, value))
}

/// Inserts explicit `&` between adjacent tokens per the implicit-AND rules:
/// term-term, `)`-term, term-`(`, term-`!`.
fn insert_implicit_and(tokens: &[Token]) -> Vec<Token> {
    let is_term_like = |t: &Token| matches!(t, Token::Term(_) | Token::Quoted(_) | Token::KeyValue(_));
    let mut out = Vec::with_capacity(tokens.len());
    for (i, t) in tokens.iter().enumerate() {
        if i > 0 {
            let prev = &tokens[i - 1];
            let needs_and = (is_term_like(prev) && is_term_like(t))
                || (*prev == Token::CloseParen && is_term_like(t))
                || (is_term_like(prev) && *t == Token::OpenParen)
                || (is_term_like(prev) && *t == Token::Not);
            if needs_and {
                out.push(Token::And);
            }
        }
        out.push(t.clone());
    }
    out
}

fn parse_or(tokens: &[Token], pos: &mut usize) -> Result<Expression, QueryError> {
    let mut parts = vec![parse_and(tokens, pos)?];
    while matches!(tokens.get(*pos), Some(Token::Or)) {
        *pos += 1;
        parts.push(parse_and(tokens, pos)?);
    }
    Ok(if parts.len() == 1 {
        parts.pop().unwrap()
    } else {
        Expression::Or(parts)
    })
}

fn parse_and(tokens: &[Token], pos: &mut usize) -> Result<Expression, QueryError> {
    let mut parts = vec![parse_unary(tokens, pos)?];
    while matches!(tokens.get(*pos), Some(Token::And)) {
        *pos += 1;
        parts.push(parse_unary(tokens, pos)?);
    }
    Ok(if parts.len() == 1 {
        parts.pop().unwrap()
    } else {
        Expression::And(parts)
    })
}

fn parse_unary(tokens: &[Token], pos: &mut usize) -> Result<Expression, QueryError> {
    if matches!(tokens.get(*pos), Some(Token::Not)) {
        *pos += 1;
        let inner = parse_unary(tokens, pos)?;
        return Ok(Expression::Not(Box::new(inner)));
    }
    parse_primary(tokens, pos)
}

fn parse_primary(tokens: &[Token], pos: &mut usize) -> Result<Expression, QueryError> {
    match tokens.get(*pos) {
        Some(Token::OpenParen) => {
            *pos += 1;
            let expr = parse_or(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Token::CloseParen) => {
                    *pos += 1;
                    Ok(expr)
                }
                _ => Err(QueryError::UnbalancedParentheses),
            }
        }
        Some(t @ (Token::Term(_) | Token::Quoted(_) | Token::KeyValue(_))) => {
            *pos += 1;
            Ok(token_to_simple_expression(t))
        }
        _ => Err(QueryError::MissingOperand),
    }
}
