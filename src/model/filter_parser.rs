/// Query filter predicate parser
///
/// Parses the textual form of an entity query filter into a `Lambda` over the
/// host expression tree. The grammar is a small subset of C#-style lambdas:
/// - Parameter declaration: `c => ...`
/// - Member chains rooted at the parameter: `c.Tenant.Id`
/// - Literals: integers, decimals, `'strings'`, `true`, `false`, `null`
/// - Query parameters: `@tenant`
/// - Comparison operators: `==`, `!=`, `<`, `>`, `<=`, `>=`
/// - Boolean operators: `&&`, `||`, `!`
///
/// Examples:
/// - `c => c.TenantId == @tenant`
/// - `o => !o.IsDeleted && (o.Total > 0 || o.Customer.IsVip == true)`
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0},
    combinator::{opt, recognize, value},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};
use std::sync::Arc;

use crate::query_planner::logical_expr::{
    Lambda, Literal, LogicalExpr, Operator, OperatorApplication, Parameter,
};

/// Parse a query filter such as `c => c.TenantId == @tenant`
pub fn parse_query_filter(input: &str) -> Result<Lambda, String> {
    let (remaining, lambda) =
        parse_lambda(input.trim()).map_err(|e| format!("Query filter parse error: {:?}", e))?;
    if !remaining.trim().is_empty() {
        return Err(format!("Unexpected trailing content: '{}'", remaining));
    }
    Ok(lambda)
}

fn symbol<'a>(text: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| preceded(multispace0, tag(text)).parse(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn parse_lambda(input: &str) -> IResult<&str, Lambda> {
    let (input, name) = identifier(input)?;
    let (input, _) = delimited(multispace0, tag("=>"), multispace0).parse(input)?;
    let parameter = Parameter::new(name);
    let (input, body) = parse_or_expr(&parameter, input)?;
    Ok((input, Lambda::new(vec![parameter], body)))
}

/// Parse OR expressions (lowest precedence)
fn parse_or_expr<'a>(parameter: &Parameter, input: &'a str) -> IResult<&'a str, Arc<LogicalExpr>> {
    let (mut input, mut current) = parse_and_expr(parameter, input)?;

    while let Ok((rest, _)) = symbol("||")(input) {
        let (rest, right) = parse_and_expr(parameter, rest)?;
        current = binary(Operator::Or, current, right);
        input = rest;
    }

    Ok((input, current))
}

/// Parse AND expressions
fn parse_and_expr<'a>(
    parameter: &Parameter,
    input: &'a str,
) -> IResult<&'a str, Arc<LogicalExpr>> {
    let (mut input, mut current) = parse_comparison_expr(parameter, input)?;

    while let Ok((rest, _)) = symbol("&&")(input) {
        let (rest, right) = parse_comparison_expr(parameter, rest)?;
        current = binary(Operator::And, current, right);
        input = rest;
    }

    Ok((input, current))
}

fn parse_comparison_expr<'a>(
    parameter: &Parameter,
    input: &'a str,
) -> IResult<&'a str, Arc<LogicalExpr>> {
    let (input, left) = parse_unary_expr(parameter, input)?;

    let comparison: IResult<&str, Operator> = preceded(
        multispace0,
        alt((
            value(Operator::Equal, tag("==")),
            value(Operator::NotEqual, tag("!=")),
            value(Operator::LessThanEqual, tag("<=")),
            value(Operator::GreaterThanEqual, tag(">=")),
            value(Operator::LessThan, tag("<")),
            value(Operator::GreaterThan, tag(">")),
        )),
    )
    .parse(input);

    match comparison {
        Ok((input, op)) => {
            let (input, right) = parse_unary_expr(parameter, input)?;
            Ok((input, binary(op, left, right)))
        }
        Err(_) => Ok((input, left)),
    }
}

fn parse_unary_expr<'a>(
    parameter: &Parameter,
    input: &'a str,
) -> IResult<&'a str, Arc<LogicalExpr>> {
    let (input, _) = multispace0(input)?;

    if input.starts_with('!') && !input.starts_with("!=") {
        let (input, operand) = parse_unary_expr(parameter, &input[1..])?;
        return Ok((
            input,
            Arc::new(LogicalExpr::Operator(OperatorApplication {
                operator: Operator::Not,
                operands: vec![operand],
            })),
        ));
    }

    parse_primary_expr(parameter, input)
}

fn parse_primary_expr<'a>(
    parameter: &Parameter,
    input: &'a str,
) -> IResult<&'a str, Arc<LogicalExpr>> {
    if let Ok((input, _)) = char::<&str, Error<&str>>('(').parse(input) {
        let (input, inner) = parse_or_expr(parameter, input)?;
        let (input, _) = symbol(")")(input)?;
        return Ok((input, inner));
    }

    if let Ok((input, text)) = parse_string_literal(input) {
        return Ok((input, literal(Literal::String(text.to_string()))));
    }

    if let Ok((input, number)) = parse_number(input) {
        return Ok((input, literal(number)));
    }

    if let Ok((input, name)) = preceded(char('@'), identifier).parse(input) {
        return Ok((input, Arc::new(LogicalExpr::QueryParameter(name.to_string()))));
    }

    let (rest, head) = identifier(input)?;
    match head {
        "true" => return Ok((rest, literal(Literal::Boolean(true)))),
        "false" => return Ok((rest, literal(Literal::Boolean(false)))),
        "null" => return Ok((rest, literal(Literal::Null))),
        _ => {}
    }

    if head != parameter.name {
        // Only members of the lambda parameter can appear in a query filter
        return Err(nom::Err::Failure(Error::new(input, ErrorKind::Verify)));
    }

    let (rest, members) = many0(preceded(char('.'), identifier)).parse(rest)?;
    let chain = members
        .into_iter()
        .fold(LogicalExpr::parameter(parameter), |expr, member| {
            LogicalExpr::member(expr, member)
        });
    Ok((rest, chain))
}

fn parse_string_literal(input: &str) -> IResult<&str, &str> {
    delimited(char('\''), take_while(|c| c != '\''), char('\'')).parse(input)
}

fn parse_number(input: &str) -> IResult<&str, Literal> {
    let (rest, text) = recognize(pair(
        opt(char('-')),
        pair(digit1, opt(pair(char('.'), digit1))),
    ))
    .parse(input)?;

    if let Ok(int) = text.parse::<i64>() {
        return Ok((rest, Literal::Integer(int)));
    }
    match text.parse::<f64>() {
        Ok(float) => Ok((rest, Literal::Float(float))),
        Err(_) => Err(nom::Err::Error(Error::new(input, ErrorKind::Float))),
    }
}

fn literal(value: Literal) -> Arc<LogicalExpr> {
    Arc::new(LogicalExpr::Literal(value))
}

fn binary(operator: Operator, left: Arc<LogicalExpr>, right: Arc<LogicalExpr>) -> Arc<LogicalExpr> {
    Arc::new(LogicalExpr::Operator(OperatorApplication {
        operator,
        operands: vec![left, right],
    }))
}
