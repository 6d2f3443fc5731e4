use crate::ast::{Filter, FilterOperation, FilterSet};
use crate::Error;
use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{all_consuming, map, map_res, opt, recognize, value};
use nom::multi::separated_list0;
use nom::number::complete::recognize_float;
use nom::sequence::{delimited, pair, terminated, tuple};
use nom::{Finish, IResult};
use serde_json::Value;

const MAX_FRAGMENT_LEN: usize = 16;

pub fn parse(selector: &str) -> Result<FilterSet, Error> {
    if selector.trim().is_empty() {
        return Ok(FilterSet::new());
    }

    all_consuming(delimited(multispace0, filter_set, multispace0))(selector)
        .finish()
        .map(|(_, set)| set)
        .map_err(|e| Error::Syntax {
            position: selector.len() - e.input.len(),
            fragment: e.input.chars().take(MAX_FRAGMENT_LEN).collect(),
        })
}

fn filter_set(input: &str) -> IResult<&str, FilterSet> {
    map(
        delimited(
            terminated(char('{'), multispace0),
            terminated(
                separated_list0(delimited(multispace0, char(','), multispace0), filter),
                opt(pair(multispace0, char(','))),
            ),
            pair(multispace0, char('}')),
        ),
        FilterSet::from,
    )(input)
}

fn filter(input: &str) -> IResult<&str, Filter> {
    map(
        tuple((
            key,
            delimited(multispace0, operation, multispace0),
            literal,
        )),
        |(key, operation, value)| Filter::new(key, operation, value),
    )(input)
}

fn key(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    ))(input)
}

fn operation(input: &str) -> IResult<&str, FilterOperation> {
    alt((
        value(FilterOperation::Neq, tag("!=")),
        value(FilterOperation::Eq, tag("=")),
    ))(input)
}

fn literal(input: &str) -> IResult<&str, Value> {
    alt((
        map(string, Value::String),
        map_res(recognize_float, |s: &str| serde_json::from_str::<Value>(s)),
        value(Value::Bool(true), tag("true")),
        value(Value::Bool(false), tag("false")),
        value(Value::Null, tag("null")),
    ))(input)
}

fn string(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('"'),
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((value("\\", tag("\\")), value("\"", tag("\"")))),
            )),
            char('"'),
        ),
        Option::unwrap_or_default,
    )(input)
}
