//! Terminal command parsing.

use kurbo::{Point, Vec2};
use thiserror::Error;
use vuedraw_core::ShapeEntry;

/// Command parse errors.
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Unknown command: {0} (try `help`)")]
    Unknown(String),
    #[error("`{command}` needs <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("Not a number: {0}")]
    InvalidNumber(String),
}

/// A parsed terminal command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Add a new shape on top of the board.
    Draw(ShapeEntry),
    /// Delete a shape by list index, id or id prefix.
    Delete(String),
    /// Move a shape by an offset.
    Move { target: String, delta: Vec2 },
    Undo,
    Redo,
    List,
    Users,
    Status,
    /// Change the published user name.
    Name(String),
    /// Change the published user color.
    Color(String),
    /// Navigate to another page.
    Open(String),
    Help,
    Quit,
}

/// Command reference printed by `help`.
pub const HELP: &str = "\
Drawing:
  rect X Y W H          add a rectangle
  ellipse CX CY RX RY   add an ellipse
  tri X Y W H           add a triangle
  line X1 Y1 X2 Y2      add a line
  text X Y WORDS...     add a text box
  del SHAPE             delete a shape (list index, id or id prefix)
  move SHAPE DX DY      move a shape
  undo | redo           step through your own edits

Session:
  list                  list shapes back to front
  users                 list people on the board
  name NAME             change your name
  color COLOR           change your color
  status                show connection and room
  open PATH             go to another page (/, /about)
  help                  show this help
  quit                  leave the board";

struct Args<'a> {
    command: &'static str,
    words: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn word(&mut self, argument: &'static str) -> Result<&'a str, CommandError> {
        self.words.next().ok_or(CommandError::MissingArgument {
            command: self.command,
            argument,
        })
    }

    fn number(&mut self, argument: &'static str) -> Result<f64, CommandError> {
        let word = self.word(argument)?;
        word.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| CommandError::InvalidNumber(word.to_string()))
    }

    fn point(&mut self, x: &'static str, y: &'static str) -> Result<Point, CommandError> {
        Ok(Point::new(self.number(x)?, self.number(y)?))
    }

    fn rest(&mut self, argument: &'static str) -> Result<String, CommandError> {
        let rest: Vec<&str> = self.words.by_ref().collect();
        if rest.is_empty() {
            return Err(CommandError::MissingArgument {
                command: self.command,
                argument,
            });
        }
        Ok(rest.join(" "))
    }
}

impl Command {
    /// Parse one input line. Blank lines parse to `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let command = match head {
            "rect" => "rect",
            "ellipse" => "ellipse",
            "tri" => "tri",
            "line" => "line",
            "text" => "text",
            "del" | "delete" | "rm" => "del",
            "move" | "mv" => "move",
            "undo" => return Ok(Some(Command::Undo)),
            "redo" => return Ok(Some(Command::Redo)),
            "list" | "ls" => return Ok(Some(Command::List)),
            "users" => return Ok(Some(Command::Users)),
            "status" => return Ok(Some(Command::Status)),
            "help" | "?" => return Ok(Some(Command::Help)),
            "quit" | "exit" | "q" => return Ok(Some(Command::Quit)),
            "name" => "name",
            "color" => "color",
            "open" => "open",
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        let mut args = Args { command, words };

        let parsed = match command {
            "rect" => {
                let origin = args.point("x", "y")?;
                Command::Draw(ShapeEntry::rect(origin, args.number("w")?, args.number("h")?))
            }
            "ellipse" => {
                let center = args.point("cx", "cy")?;
                Command::Draw(ShapeEntry::ellipse(center, args.number("rx")?, args.number("ry")?))
            }
            "tri" => {
                let origin = args.point("x", "y")?;
                Command::Draw(ShapeEntry::triangle(origin, args.number("w")?, args.number("h")?))
            }
            "line" => {
                let start = args.point("x1", "y1")?;
                Command::Draw(ShapeEntry::line(start, args.point("x2", "y2")?))
            }
            "text" => {
                let origin = args.point("x", "y")?;
                Command::Draw(ShapeEntry::textbox(origin, args.rest("words")?))
            }
            "del" => Command::Delete(args.word("shape")?.to_string()),
            "move" => {
                let target = args.word("shape")?.to_string();
                let delta = Vec2::new(args.number("dx")?, args.number("dy")?);
                Command::Move { target, delta }
            }
            "name" => Command::Name(args.rest("name")?),
            "color" => Command::Color(args.word("color")?.to_string()),
            _ => Command::Open(args.word("path")?.to_string()),
        };
        Ok(Some(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vuedraw_core::ShapeKind;

    fn parse(line: &str) -> Command {
        Command::parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(Command::parse("   "), Ok(None));
    }

    #[test]
    fn test_parse_rect() {
        let Command::Draw(shape) = parse("rect 10 20 30 40") else {
            panic!("expected draw");
        };
        assert_eq!(shape.kind, ShapeKind::Rect);
        assert_eq!(shape.position(), Some(Point::new(10.0, 20.0)));
        assert_eq!(shape.prop("width"), Some(&serde_json::json!(30.0)));
        assert!(!shape.id.is_empty());
    }

    #[test]
    fn test_parse_text_keeps_words() {
        let Command::Draw(shape) = parse("text 0 0 hello   big world") else {
            panic!("expected draw");
        };
        assert_eq!(shape.kind, ShapeKind::Textbox);
        assert_eq!(shape.prop("text"), Some(&serde_json::json!("hello big world")));
    }

    #[test]
    fn test_parse_move_and_delete() {
        assert_eq!(
            parse("mv 3 5 -2.5"),
            Command::Move {
                target: "3".into(),
                delta: Vec2::new(5.0, -2.5)
            }
        );
        assert_eq!(parse("del abc"), Command::Delete("abc".into()));
        assert_eq!(parse("open /about"), Command::Open("/about".into()));
        assert_eq!(parse("name Ada Lovelace"), Command::Name("Ada Lovelace".into()));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse("draw"), Err(CommandError::Unknown("draw".into())));
        assert_eq!(
            Command::parse("rect 1 2 3"),
            Err(CommandError::MissingArgument {
                command: "rect",
                argument: "h"
            })
        );
        assert_eq!(Command::parse("line 1 x 2 3"), Err(CommandError::InvalidNumber("x".into())));
        assert_eq!(Command::parse("rect 1 2 NaN 4"), Err(CommandError::InvalidNumber("NaN".into())));
        assert!(matches!(Command::parse("text 1 2"), Err(CommandError::MissingArgument { .. })));
    }
}
