//! 公式文本语法：
//!
//! ```text
//! formula := or
//! or      := and (("|" | "or") and)*
//! and     := until (("&" | "and") until)*
//! until   := unary ("U" window unary)?
//! unary   := ("!" | "not") unary | ("F" | "G") window unary | primary
//! primary := "(" formula ")" | "true" | "false" | ident cmp number
//! window  := "[" number "," number "]"
//! ```
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, multispace0, satisfy};
use nom::combinator::{cut, not, opt, recognize, value};
use nom::error::Error as NomError;
use nom::multi::many0;
use nom::number::complete::double;
use nom::sequence::{delimited, preceded, separated_pair, terminated};
use nom::{IResult, Parser};
use thiserror::Error;

use super::{Comparison, Expr, Window};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at byte {position} near `{token}`: {message}")]
pub struct FormulaSyntaxError {
    pub position: usize,
    pub token: String,
    pub message: String,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn ws<'a, O, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = NomError<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = NomError<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

/// A word that is not the prefix of a longer identifier.
fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = NomError<&'a str>> {
    terminated(tag(word), not(satisfy(is_ident_char)))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize((
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))
    .parse(input)
}

fn comparison(input: &str) -> IResult<&str, Comparison> {
    alt((
        value(Comparison::GreaterEq, tag(">=")),
        value(Comparison::LessEq, tag("<=")),
        value(Comparison::Equal, tag("==")),
        value(Comparison::Equal, tag("=")),
        value(Comparison::Greater, tag(">")),
        value(Comparison::Less, tag("<")),
    ))
    .parse(input)
}

fn window(input: &str) -> IResult<&str, Window> {
    delimited(
        ws(char('[')),
        separated_pair(ws(double), char(','), ws(double)),
        ws(char(']')),
    )
    .map(|(lower, upper)| Window { lower, upper })
    .parse(input)
}

fn atom(input: &str) -> IResult<&str, Expr> {
    (ws(identifier), ws(comparison), ws(double))
        .map(|(place, cmp, constant)| Expr::atom(place, cmp, constant))
        .parse(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    alt((
        preceded(ws(char('(')), cut(terminated(or_expr, ws(char(')'))))),
        value(Expr::True, ws(keyword("true"))),
        value(Expr::False, ws(keyword("false"))),
        atom,
    ))
    .parse(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        preceded(ws(alt((tag("!"), keyword("not")))), cut(unary)).map(|e| Expr::Not(Box::new(e))),
        (ws(alt((tag("F"), tag("G")))), window, cut(unary)).map(|(op, w, e)| {
            if op == "F" {
                Expr::Eventually(w, Box::new(e))
            } else {
                Expr::Always(w, Box::new(e))
            }
        }),
        primary,
    ))
    .parse(input)
}

fn until_expr(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = unary(input)?;
    let (input, rhs) = opt(preceded(ws(keyword("U")), cut((window, unary)))).parse(input)?;
    Ok(match rhs {
        Some((w, rhs)) => (input, Expr::Until(Box::new(lhs), Box::new(rhs), w)),
        None => (input, lhs),
    })
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = until_expr(input)?;
    let (input, rest) =
        many0(preceded(ws(alt((tag("&"), keyword("and")))), cut(until_expr))).parse(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e)));
    Ok((input, expr))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) =
        many0(preceded(ws(alt((tag("|"), keyword("or")))), cut(and_expr))).parse(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |acc, e| Expr::Or(Box::new(acc), Box::new(e)));
    Ok((input, expr))
}

fn syntax_error(text: &str, rest: &str, message: &str) -> FormulaSyntaxError {
    let rest = rest.trim_start();
    let token = rest
        .split_whitespace()
        .next()
        .unwrap_or("end of input")
        .to_string();
    let message = if rest.is_empty() {
        "unexpected end of formula".to_string()
    } else {
        message.to_string()
    };
    FormulaSyntaxError {
        position: text.len() - rest.len(),
        token,
        message,
    }
}

pub fn parse_formula(text: &str) -> Result<Expr, FormulaSyntaxError> {
    match or_expr(text) {
        Ok((rest, expr)) if rest.trim().is_empty() => Ok(expr),
        Ok((rest, _)) => Err(syntax_error(text, rest, "unexpected trailing input")),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            Err(syntax_error(text, e.input, e.code.description()))
        }
        Err(nom::Err::Incomplete(_)) => Err(syntax_error(text, "", "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(place: &str, cmp: Comparison, constant: f64) -> Box<Expr> {
        Box::new(Expr::atom(place, cmp, constant))
    }

    #[test]
    fn parses_atoms_and_connectives() {
        let expr = parse_formula("tank >= 5 & not on == 0 | false").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(Expr::And(
                    atom("tank", Comparison::GreaterEq, 5.0),
                    Box::new(Expr::Not(atom("on", Comparison::Equal, 0.0))),
                )),
                Box::new(Expr::False),
            )
        );
    }

    #[test]
    fn parses_bounded_operators() {
        let expr = parse_formula("(tank > 2) U[0, 3.5] (level<1)").unwrap();
        assert_eq!(
            expr,
            Expr::Until(
                atom("tank", Comparison::Greater, 2.0),
                atom("level", Comparison::Less, 1.0),
                Window::new(0.0, 3.5),
            )
        );
        let expr = parse_formula("G[1,2] F [0,1] tank = 3").unwrap();
        assert_eq!(
            expr,
            Expr::Always(
                Window::new(1.0, 2.0),
                Box::new(Expr::Eventually(
                    Window::new(0.0, 1.0),
                    atom("tank", Comparison::Equal, 3.0),
                )),
            )
        );
    }

    #[test]
    fn keywords_do_not_swallow_place_names() {
        let expr = parse_formula("nothing <= 1 and Flow > 0 or order < 2").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(Expr::And(
                    atom("nothing", Comparison::LessEq, 1.0),
                    atom("Flow", Comparison::Greater, 0.0),
                )),
                atom("order", Comparison::Less, 2.0),
            )
        );
        assert_eq!(
            parse_formula("F >= 1").unwrap(),
            Expr::atom("F", Comparison::GreaterEq, 1.0)
        );
    }

    #[test]
    fn reports_error_position() {
        let err = parse_formula("tank ~ 5").unwrap_err();
        assert_eq!(err.position, 5);
        assert_eq!(err.token, "~");

        let err = parse_formula("tank >= 5 )").unwrap_err();
        assert_eq!(err.position, 10);
        assert_eq!(err.message, "unexpected trailing input");

        let err = parse_formula("(tank >= 5").unwrap_err();
        assert_eq!(err.position, 10);
        assert_eq!(err.token, "end of input");

        assert!(parse_formula("").is_err());
    }
}
