//! Newick reader and writer for clonal frames.
//!
//! Heights are derived from branch lengths: the deepest tip sits at height
//! zero and every other node at `max_depth - depth`.

use acg_core::errors::{AcgError, ErrorInfo};

use crate::frame::ClonalFrame;
use crate::ids::NodeId;

const LABEL_DELIMITERS: &[u8] = b"([,:; \n\t\r)]";

#[derive(Debug)]
struct RawNode {
    children: Vec<usize>,
    label: Option<String>,
    length: f64,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn consume_if(&mut self, byte: u8) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> AcgError {
        AcgError::Serde(
            ErrorInfo::new("newick-syntax", message)
                .with_context("offset", self.pos)
                .with_context(
                    "found",
                    self.peek().map_or("end of input".to_owned(), |b| (b as char).to_string()),
                ),
        )
    }

    fn parse_label(&mut self) -> Result<Option<String>, AcgError> {
        self.skip_whitespace();
        if self.peek() == Some(b'\'') {
            self.pos += 1;
            let mut label = String::new();
            loop {
                match self.peek() {
                    None => return Err(self.error("unterminated quoted label")),
                    Some(b'\'') if self.bytes.get(self.pos + 1) == Some(&b'\'') => {
                        label.push('\'');
                        self.pos += 2;
                    }
                    Some(b'\'') => {
                        self.pos += 1;
                        return Ok(Some(label));
                    }
                    Some(_) => {
                        let rest = &self.bytes[self.pos..];
                        let len = rest.iter().position(|b| *b == b'\'').unwrap_or(rest.len());
                        label.push_str(&String::from_utf8_lossy(&rest[..len]));
                        self.pos += len;
                    }
                }
            }
        }
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| !LABEL_DELIMITERS.contains(&b))
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned(),
        ))
    }

    fn parse_length(&mut self) -> Result<f64, AcgError> {
        if !self.consume_if(b':') {
            return Ok(0.0);
        }
        self.skip_whitespace();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
        {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|len| len.is_finite() && *len >= 0.0)
            .ok_or_else(|| self.error("expected a non-negative branch length"))
    }

    fn parse_subtree(&mut self, out: &mut Vec<RawNode>) -> Result<usize, AcgError> {
        let mut children = Vec::new();
        if self.consume_if(b'(') {
            loop {
                children.push(self.parse_subtree(out)?);
                if self.consume_if(b',') {
                    continue;
                }
                if self.consume_if(b')') {
                    break;
                }
                return Err(self.error("expected ',' or ')'"));
            }
        }
        let label = self.parse_label()?;
        let length = self.parse_length()?;
        if children.is_empty() && label.is_none() {
            return Err(self.error("leaf without a label"));
        }
        out.push(RawNode {
            children,
            label,
            length,
        });
        Ok(out.len() - 1)
    }
}

/// Parses a binary Newick tree into a clonal frame.
///
/// Leaves receive the first ids in order of appearance, internal nodes follow
/// in post-order with the root last. Child order is preserved.
pub fn parse_newick(text: &str) -> Result<ClonalFrame, AcgError> {
    let mut cursor = Cursor::new(text);
    let mut raw = Vec::new();
    let root = cursor.parse_subtree(&mut raw)?;
    if !cursor.consume_if(b';') {
        return Err(cursor.error("expected ';' at end of tree"));
    }

    let mut depth = vec![0.0; raw.len()];
    let mut stack = vec![root];
    while let Some(idx) = stack.pop() {
        for child in &raw[idx].children {
            depth[*child] = depth[idx] + raw[*child].length;
            stack.push(*child);
        }
    }
    let max_depth = depth.iter().copied().fold(0.0, f64::max);
    let height = |idx: usize| (max_depth - depth[idx]).max(0.0);

    // Children precede parents in `raw`, so ascending order is a post-order.
    let mut ids: Vec<Option<NodeId>> = vec![None; raw.len()];
    let mut frame = ClonalFrame::new();
    for idx in (0..raw.len()).filter(|i| raw[*i].children.is_empty()) {
        let label = raw[idx].label.clone().unwrap_or_default();
        ids[idx] = Some(frame.add_leaf(height(idx), label));
    }
    for idx in (0..raw.len()).filter(|i| !raw[*i].children.is_empty()) {
        let [left, right] = raw[idx].children.as_slice() else {
            return Err(AcgError::Graph(
                ErrorInfo::new("non-binary", "internal nodes must have two children")
                    .with_context("children", raw[idx].children.len()),
            ));
        };
        let (Some(left), Some(right)) = (ids[*left], ids[*right]) else {
            return Err(cursor.error("child parsed out of order"));
        };
        ids[idx] = Some(frame.join(left, right, height(idx))?);
    }
    frame.validate()?;
    Ok(frame)
}

/// Writes the clonal frame in Newick notation with branch lengths.
pub fn to_newick(frame: &ClonalFrame) -> String {
    let mut out = String::new();
    if frame.node_count() > 0 {
        write_node(frame, frame.root(), &mut out);
    }
    out.push(';');
    out
}

fn write_node(frame: &ClonalFrame, id: NodeId, out: &mut String) {
    let children = frame.children(id);
    if !children.is_empty() {
        out.push('(');
        for (pos, child) in children.iter().enumerate() {
            if pos > 0 {
                out.push(',');
            }
            write_node(frame, *child, out);
        }
        out.push(')');
    }
    match frame.label(id) {
        Some(label) => out.push_str(&escape_label(label)),
        None if children.is_empty() => out.push_str(&id.to_string()),
        None => {}
    }
    if let Some(parent_height) = frame.parent_height(id) {
        out.push(':');
        out.push_str(&(parent_height - frame.height(id)).to_string());
    }
}

fn escape_label(label: &str) -> String {
    if label.bytes().any(|b| LABEL_DELIMITERS.contains(&b) || b == b'\'') {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_owned()
    }
}
