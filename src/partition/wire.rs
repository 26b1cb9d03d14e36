//! Oracle wire format for partitions.
//!
//! The oracle consumes and produces partitions as bit-exact text:
//!
//! ```text
//! [[ alice, bob ][ carol ] ]
//! ```
//!
//! One leading `[`, then each block as `[ e1, e2 ]` with no separator between
//! blocks, then a closing ` ]`. The empty partition is `[ ]`. Elements are
//! written with their `Display` form and must not contain whitespace, commas
//! or brackets.

use std::fmt;

use crate::error::ValidationError;

use super::{Element, Partition};

/// Writes the wire text of `partition` into `out`.
pub fn write_wire<T: Element, W: fmt::Write>(partition: &Partition<T>, out: &mut W) -> fmt::Result {
    out.write_char('[')?;
    for block in partition.blocks() {
        out.write_char('[')?;
        for (i, element) in block.iter().enumerate() {
            if i > 0 {
                out.write_char(',')?;
            }
            write!(out, " {element}")?;
        }
        out.write_str(" ]")?;
    }
    out.write_str(" ]")
}

/// Returns the wire text of `partition`.
#[must_use]
pub fn to_wire<T: Element>(partition: &Partition<T>) -> String {
    let mut out = String::with_capacity(8 * partition.element_count() + 4);
    // Writing into a String cannot fail.
    let _ = write_wire(partition, &mut out);
    out
}

/// Parses wire text back into a partition of atoms.
///
/// # Errors
/// Returns [`ValidationError::MalformedWire`] if `text` does not follow the
/// grammar exactly, or [`ValidationError::OverlappingBlocks`] if an element
/// appears in two blocks.
pub fn parse(text: &str) -> Result<Partition<String>, ValidationError> {
    let mut cursor = Cursor { text, pos: 0 };
    cursor.expect("[")?;

    let mut blocks: Vec<Vec<String>> = Vec::new();
    loop {
        if cursor.eat(" ]") {
            break;
        }
        cursor.expect("[")?;
        let mut block = Vec::new();
        loop {
            cursor.expect(" ")?;
            block.push(cursor.atom()?.to_string());
            if cursor.eat(",") {
                continue;
            }
            cursor.expect(" ]")?;
            break;
        }
        blocks.push(block);
    }

    if cursor.pos != text.len() {
        return Err(cursor.error("trailing input"));
    }
    Partition::from_blocks(blocks)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), ValidationError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{token}'")))
        }
    }

    fn atom(&mut self) -> Result<&'a str, ValidationError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, ',' | '[' | ']'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected element"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn error(&self, reason: &str) -> ValidationError {
        ValidationError::MalformedWire {
            reason: format!("{reason} at offset {}", self.pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_text_is_bit_exact() {
        let partition = Partition::from_blocks(vec![vec!["bob", "alice"], vec!["carol"]]).unwrap();
        assert_eq!(partition.to_wire(), "[[ alice, bob ][ carol ] ]");
        assert_eq!(partition.to_string(), partition.to_wire());
    }

    #[test]
    fn test_empty_partition_wire() {
        assert_eq!(Partition::<String>::new().to_wire(), "[ ]");
        assert!(parse("[ ]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_accepts_own_output() {
        let parsed = parse("[[ alice, bob ][ carol ] ]").unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.are_monitored_together(&["alice"], &["bob"]));
        assert!(!parsed.are_monitored_together(&["alice"], &["carol"]));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "[",
            "[[ a ]",
            "[[ a ] [ b ] ]",
            "[[ a, ] ]",
            "[[a ] ]",
            "[[ a b ] ]",
            "[[ ] ]",
            "[[ a ] ] ",
            "[[ a ]]",
        ] {
            assert!(
                matches!(parse(bad), Err(ValidationError::MalformedWire { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_overlap() {
        assert!(matches!(
            parse("[[ a ][ a ] ]"),
            Err(ValidationError::OverlappingBlocks { .. })
        ));
    }
}
