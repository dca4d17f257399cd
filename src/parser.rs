//! Script builder
//!
//! Assembles scanned lines into a [`Test`] tree:
//! - a blank line flushes the pending comment as a standalone node, then
//!   becomes a spacer
//! - a comment directly above a command is attached to it
//! - data lines are appended to the most recent command's matching stream;
//!   a comment directly above a data line is dropped
//! - a data line before any command is a structural error

use crate::ast::{CommandNode, CommentNode, Node, SpacerNode, Test};
use crate::error::ParseError;
use crate::scanner::{scan, Line, ScannedLine};

/// Parse script text into a test tree.
pub fn parse_test(content: &str) -> Result<Test, ParseError> {
    let lines = scan(content)?;
    build(lines)
}

/// Build a test tree from scanned lines.
pub fn build(lines: Vec<ScannedLine>) -> Result<Test, ParseError> {
    let mut test = Test::default();
    let mut comment: Option<CommentNode> = None;
    // Index of the command that data lines attach to
    let mut open: Option<usize> = None;

    for ScannedLine { number, line } in lines {
        match line {
            Line::Blank { count } => {
                flush_comment(&mut test, &mut comment);
                test.children.push(Node::Spacer(SpacerNode { lines: count }));
            }
            Line::Comment { content } => {
                flush_comment(&mut test, &mut comment);
                if !content.is_empty() {
                    comment = Some(CommentNode::new(content));
                }
            }
            Line::Command { cmd, exit_code } => {
                let mut node = CommandNode::new(cmd, exit_code);
                node.comment = comment.take();
                test.children.push(Node::Command(node));
                open = Some(test.children.len() - 1);
            }
            Line::Data { stream, content } => {
                comment = None;
                let target = match open {
                    Some(idx) => test.children.get_mut(idx),
                    None => None,
                };
                let Some(Node::Command(cmd)) = target else {
                    return Err(ParseError::structure(format!(
                        "unexpected data line before any command: `{}`",
                        content.trim_end_matches('\n'),
                    )).at_line(number));
                };
                cmd.append(stream, &content);
            }
        }
    }
    flush_comment(&mut test, &mut comment);

    Ok(test)
}

fn flush_comment(test: &mut Test, comment: &mut Option<CommentNode>) {
    if let Some(node) = comment.take() {
        test.children.push(Node::Comment(node));
    }
}
