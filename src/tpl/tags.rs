//! Tag registry: tag name → node-construction function.
//!
//! Each handler is called right after the tag name has been read and consumes
//! the rest of the tag (through `%}`), plus its body and close tag for block
//! tags. The table is built once and never mutated.

use crate::Result;
use crate::error::{Position, TemplateError};
use crate::tpl::ast::{ElsifClause, Node, WhenClause};
use crate::tpl::lexer::Symbol;
use crate::tpl::parser::Parser;
use std::collections::HashMap;
use std::sync::LazyLock;

pub(crate) type TagParser = fn(&mut Parser<'_>, Position) -> Result<Node>;

static TAGS: LazyLock<HashMap<&'static str, TagParser>> = LazyLock::new(|| {
    let mut tags: HashMap<&'static str, TagParser> = HashMap::new();
    tags.insert("if", parse_if);
    tags.insert("unless", parse_unless);
    tags.insert("case", parse_case);
    tags.insert("for", parse_for);
    tags.insert("break", parse_break);
    tags.insert("continue", parse_continue);
    tags.insert("assign", parse_assign);
    tags.insert("capture", parse_capture);
    tags.insert("increment", parse_increment);
    tags.insert("decrement", parse_decrement);
    tags.insert("echo", parse_echo);
    tags.insert("include", parse_include);
    tags.insert("render", parse_render);
    tags.insert("raw", parse_raw);
    tags.insert("comment", parse_comment);
    tags
});

pub(crate) fn lookup(name: &str) -> Option<TagParser> {
    TAGS.get(name).copied()
}

/// Intermediate and closing tags only valid inside their block.
pub(crate) fn is_closing(name: &str) -> bool {
    name.starts_with("end") || matches!(name, "else" | "elsif" | "when")
}

/* ------------------------------- conditionals ------------------------------- */

fn parse_if(p: &mut Parser<'_>, position: Position) -> Result<Node> {
    parse_conditional(p, "if", "endif", position, false)
}

fn parse_unless(p: &mut Parser<'_>, position: Position) -> Result<Node> {
    parse_conditional(p, "unless", "endunless", position, true)
}

/// `if`/`unless` with any number of `elsif` and an optional `else`.
///
/// `elsif` branches stay flat on the node. `unless c` puts its first body in
/// the else position and the remaining chain, if any, under the then branch.
fn parse_conditional(
    p: &mut Parser<'_>,
    tag: &str,
    end_tag: &str,
    position: Position,
    negate: bool,
) -> Result<Node> {
    let condition = p.parse_expression()?;
    p.expect_tag_close()?;

    let end_tags = ["elsif", "else", end_tag];
    let (first_body, mut end) = p.parse_block_body(tag, position, &end_tags)?;

    let mut elsifs = Vec::new();
    let mut else_branch = None;
    loop {
        match end.name {
            "elsif" => {
                let condition = p.parse_expression()?;
                p.expect_tag_close()?;
                let (body, next) = p.parse_block_body(tag, end.position, &end_tags)?;
                elsifs.push(ElsifClause { condition, body });
                end = next;
            }
            "else" => {
                p.expect_tag_close()?;
                let (body, next) = p.parse_block_body(tag, end.position, &[end_tag])?;
                else_branch = Some(body);
                end = next;
            }
            _ => {
                p.expect_tag_close()?;
                break;
            }
        }
    }

    if !negate {
        return Ok(Node::If {
            condition,
            then_branch: first_body,
            elsifs,
            else_branch,
        });
    }

    let mut rest = elsifs.into_iter();
    let then_branch = match rest.next() {
        Some(first) => vec![Node::If {
            condition: first.condition,
            then_branch: first.body,
            elsifs: rest.collect(),
            else_branch,
        }],
        None => else_branch.unwrap_or_default(),
    };
    Ok(Node::If {
        condition,
        then_branch,
        elsifs: Vec::new(),
        else_branch: Some(first_body),
    })
}

/// `case x` / `when a, b` / `when c or d` / `else` / `endcase`.
fn parse_case(p: &mut Parser<'_>, position: Position) -> Result<Node> {
    let subject = p.parse_expression()?;
    p.expect_tag_close()?;

    let end_tags = ["when", "else", "endcase"];
    // Anything before the first `when` is never rendered.
    let (_, mut end) = p.parse_block_body("case", position, &end_tags)?;

    let mut whens = Vec::new();
    let mut else_branch = None;
    loop {
        match end.name {
            "when" => {
                let mut values = vec![p.parse_primary()?];
                while p.eat_symbol(Symbol::Comma)? || p.eat_keyword("or")? {
                    values.push(p.parse_primary()?);
                }
                p.expect_tag_close()?;
                let (body, next) = p.parse_block_body("case", end.position, &end_tags)?;
                whens.push(WhenClause { values, body });
                end = next;
            }
            "else" => {
                p.expect_tag_close()?;
                let (body, next) = p.parse_block_body("case", end.position, &["endcase"])?;
                else_branch = Some(body);
                end = next;
            }
            _ => {
                p.expect_tag_close()?;
                break;
            }
        }
    }

    Ok(Node::Case {
        subject,
        whens,
        else_branch,
    })
}

/* ---------------------------------- loops ---------------------------------- */

/// `for item in collection [reversed] [limit: n] [offset: n]`
fn parse_for(p: &mut Parser<'_>, position: Position) -> Result<Node> {
    let variable = p.expect_ident("loop variable")?.to_string();
    if !p.eat_keyword("in")? {
        return Err(TemplateError::parse(
            "expected 'in' after the loop variable",
            p.position(),
        ));
    }
    let iterable = p.parse_primary()?;

    let mut limit = None;
    let mut offset = None;
    let mut reversed = false;
    while !p.at_tag_close()? {
        let attribute = p.expect_ident("'reversed', 'limit' or 'offset'")?;
        match attribute {
            "reversed" => reversed = true,
            "limit" => {
                p.expect_symbol(Symbol::Colon, "':'")?;
                limit = Some(p.parse_primary()?);
            }
            "offset" => {
                p.expect_symbol(Symbol::Colon, "':'")?;
                offset = Some(p.parse_primary()?);
            }
            other => {
                return Err(TemplateError::parse(
                    format!("unknown for-loop attribute '{}'", other),
                    p.position(),
                ));
            }
        }
        p.eat_symbol(Symbol::Comma)?;
    }
    p.expect_tag_close()?;

    let (body, end) = p.parse_block_body("for", position, &["else", "endfor"])?;
    let else_branch = if end.name == "else" {
        p.expect_tag_close()?;
        let (body, _) = p.parse_block_body("for", end.position, &["endfor"])?;
        Some(body)
    } else {
        None
    };
    p.expect_tag_close()?;

    Ok(Node::For {
        variable,
        iterable,
        limit,
        offset,
        reversed,
        body,
        else_branch,
    })
}

fn parse_break(p: &mut Parser<'_>, _: Position) -> Result<Node> {
    p.expect_tag_close()?;
    Ok(Node::Break)
}

fn parse_continue(p: &mut Parser<'_>, _: Position) -> Result<Node> {
    p.expect_tag_close()?;
    Ok(Node::Continue)
}

/* -------------------------------- variables -------------------------------- */

fn parse_assign(p: &mut Parser<'_>, _: Position) -> Result<Node> {
    let name = p.expect_ident("variable name")?.to_string();
    p.expect_symbol(Symbol::Assign, "'='")?;
    let expr = p.parse_expression()?;
    p.expect_tag_close()?;
    Ok(Node::Assign { name, expr })
}

fn parse_capture(p: &mut Parser<'_>, position: Position) -> Result<Node> {
    let name = p.expect_name("variable name")?.to_string();
    p.expect_tag_close()?;
    let (body, _) = p.parse_block_body("capture", position, &["endcapture"])?;
    p.expect_tag_close()?;
    Ok(Node::Capture { name, body })
}

fn parse_counter(p: &mut Parser<'_>, step: i64) -> Result<Node> {
    let name = p.expect_ident("counter name")?.to_string();
    p.expect_tag_close()?;
    Ok(Node::Counter { name, step })
}

fn parse_increment(p: &mut Parser<'_>, _: Position) -> Result<Node> {
    parse_counter(p, 1)
}

fn parse_decrement(p: &mut Parser<'_>, _: Position) -> Result<Node> {
    parse_counter(p, -1)
}

fn parse_echo(p: &mut Parser<'_>, _: Position) -> Result<Node> {
    let expr = p.parse_expression()?;
    p.expect_tag_close()?;
    Ok(Node::Output(expr))
}

/* --------------------------------- partials -------------------------------- */

fn parse_include(p: &mut Parser<'_>, _: Position) -> Result<Node> {
    parse_partial(p, false)
}

fn parse_render(p: &mut Parser<'_>, _: Position) -> Result<Node> {
    parse_partial(p, true)
}

/// `include 'name'` / `render 'name', key: value, ...`
fn parse_partial(p: &mut Parser<'_>, isolated: bool) -> Result<Node> {
    let template = p.parse_primary()?;
    let mut args = Vec::new();
    while p.eat_symbol(Symbol::Comma)? {
        let key = p.expect_ident("argument name")?.to_string();
        p.expect_symbol(Symbol::Colon, "':'")?;
        args.push((key, p.parse_logical()?));
    }
    p.expect_tag_close()?;
    Ok(Node::Include {
        template,
        args,
        isolated,
    })
}

/* ------------------------------ verbatim blocks ----------------------------- */

/// The lexer hands the body over as plain text.
fn parse_raw(p: &mut Parser<'_>, position: Position) -> Result<Node> {
    p.expect_tag_close()?;
    let (body, _) = p.parse_block_body("raw", position, &["endraw"])?;
    p.expect_tag_close()?;
    Ok(Node::Block(body))
}

fn parse_comment(p: &mut Parser<'_>, position: Position) -> Result<Node> {
    p.expect_tag_close()?;
    p.parse_block_body("comment", position, &["endcomment"])?;
    p.expect_tag_close()?;
    Ok(Node::Block(Vec::new()))
}
