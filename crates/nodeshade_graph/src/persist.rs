// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line-oriented text format for graphs and their UI nodes.
//!
//! The document has two sections. `#graph` lists the id counter, every node
//! and every edge; `#ui_nodes` lists the root and one `uin` record per UI
//! node, holding its pin ids followed by its payload. Edges are written in
//! id order, which is creation order, so neighbor order (and therefore
//! operand order) survives a round trip.

use crate::edge::{Edge, EdgeId, EdgeKind};
use crate::graph::{Graph, GraphError};
use crate::node::{Direction, Node, NodeId, NodeType};
use crate::nodes::{UiNode, UiNodeKind, UiNodeOps};
use crate::value::{Value, ValueKind};
use crate::value_store::ValueStore;
use std::collections::HashSet;
use std::fmt::{Display, Write as _};
use std::str::FromStr;

const GRAPH_HEADER: &str = "#graph";
const UI_HEADER: &str = "#ui_nodes";
const NODE_TAG: &str = "n";
const EDGE_TAG: &str = "e";
const UI_TAG: &str = "uin";
const NONE_TOKEN: &str = "-";

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Reading or writing the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed document
    #[error("Line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },

    /// The document describes an inconsistent graph
    #[error("Invalid graph: {0}")]
    Graph(#[from] GraphError),
}

/// Result type for persistence
pub type Result<T> = std::result::Result<T, PersistError>;

/// Escape whitespace and `%` so any string fits in one token
fn encode_token(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '%' || c.is_whitespace() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{byte:02X}");
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn decode_token(token: &str) -> Option<String> {
    let bytes = token.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = token.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Builds whitespace-separated records
#[derive(Debug, Default)]
pub struct RecordWriter {
    out: String,
    line_start: bool,
}

impl RecordWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self {
            out: String::new(),
            line_start: true,
        }
    }

    fn token(&mut self, token: impl Display) -> &mut Self {
        if !self.line_start {
            self.out.push(' ');
        }
        let _ = write!(self.out, "{token}");
        self.line_start = false;
        self
    }

    /// Write a node id
    pub fn id(&mut self, id: NodeId) -> &mut Self {
        self.token(id)
    }

    /// Write an optional node id, `-1` when unset
    pub fn optional_id(&mut self, id: Option<NodeId>) -> &mut Self {
        match id {
            Some(id) => self.id(id),
            None => self.i32(-1),
        }
    }

    /// Write an unsigned integer
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.token(value)
    }

    /// Write a signed integer
    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.token(value)
    }

    /// Write a float. `Display` output parses back to the same bits.
    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.token(value)
    }

    /// Write several floats
    pub fn floats(&mut self, values: &[f32]) -> &mut Self {
        for value in values {
            self.f32(*value);
        }
        self
    }

    /// Write a value's components
    pub fn value(&mut self, value: &Value) -> &mut Self {
        match value {
            Value::I32(v) => self.i32(*v),
            other => self.floats(&other.components()),
        }
    }

    /// Write a required string
    pub fn word(&mut self, text: &str) -> &mut Self {
        self.token(encode_token(text))
    }

    /// Write an optional string, `-` when unset
    pub fn text(&mut self, text: Option<&str>) -> &mut Self {
        match text {
            Some(text) if !text.is_empty() => {
                let token = if text == NONE_TOKEN {
                    "%2D".to_string()
                } else {
                    encode_token(text)
                };
                self.token(token)
            }
            _ => self.token(NONE_TOKEN),
        }
    }

    /// End the current line
    pub fn new_line(&mut self) -> &mut Self {
        self.out.push('\n');
        self.line_start = true;
        self
    }

    /// Get the text written so far, terminated by a newline
    pub fn finish(mut self) -> String {
        if !self.line_start {
            self.new_line();
        }
        self.out
    }
}

/// Token cursor over a document. Blank lines are ignored.
#[derive(Debug)]
pub struct RecordReader<'a> {
    lines: Vec<(usize, &'a str)>,
    current: Option<usize>,
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> RecordReader<'a> {
    /// Create a reader positioned before the first line
    pub fn new(text: &'a str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| (index + 1, line))
            .collect();
        Self {
            lines,
            current: None,
            tokens: "".split_whitespace(),
        }
    }

    /// 1-based number of the current line (0 before the first)
    pub fn line(&self) -> usize {
        self.current.map_or(0, |i| self.lines[i].0)
    }

    /// Build a parse error at the current line
    pub fn error(&self, message: impl Into<String>) -> PersistError {
        PersistError::Parse {
            line: self.line(),
            message: message.into(),
        }
    }

    fn next_index(&self) -> usize {
        self.current.map_or(0, |i| i + 1)
    }

    /// Whether every line has been consumed
    pub fn at_end(&self) -> bool {
        self.next_index() >= self.lines.len()
    }

    /// Advance to the next line
    pub fn next_line(&mut self) -> Result<()> {
        let index = self.next_index();
        let Some(&(_, line)) = self.lines.get(index) else {
            return Err(self.error("unexpected end of document"));
        };
        self.current = Some(index);
        self.tokens = line.split_whitespace();
        Ok(())
    }

    /// Skip lines until the next one starting with `keyword`
    pub fn skip_until(&mut self, keyword: &str) {
        while let Some(&(_, line)) = self.lines.get(self.next_index()) {
            if line.split_whitespace().next() == Some(keyword) {
                return;
            }
            self.current = Some(self.next_index());
            self.tokens = "".split_whitespace();
        }
    }

    /// Next raw token on the current line
    pub fn token(&mut self) -> Result<&'a str> {
        match self.tokens.next() {
            Some(token) => Ok(token),
            None => Err(self.error("unexpected end of line")),
        }
    }

    /// Consume a token that must equal `expected`
    pub fn expect(&mut self, expected: &str) -> Result<()> {
        let token = self.token()?;
        if token != expected {
            return Err(self.error(format!("expected '{expected}', found '{token}'")));
        }
        Ok(())
    }

    fn parse<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.token()?;
        token
            .parse()
            .map_err(|_| self.error(format!("expected {what}, found '{token}'")))
    }

    /// Read a node id
    pub fn id(&mut self) -> Result<NodeId> {
        self.parse("a node id").map(NodeId)
    }

    /// Read an optional node id. Negative numbers and `-` mean unset.
    pub fn optional_id(&mut self) -> Result<Option<NodeId>> {
        let token = self.token()?;
        if token == NONE_TOKEN {
            return Ok(None);
        }
        match token.parse::<i64>() {
            Ok(v) if v < 0 => Ok(None),
            Ok(v) => u32::try_from(v)
                .map(|v| Some(NodeId(v)))
                .map_err(|_| self.error(format!("node id {v} out of range"))),
            Err(_) => Err(self.error(format!("expected a node id, found '{token}'"))),
        }
    }

    /// Read an unsigned integer
    pub fn u32(&mut self) -> Result<u32> {
        self.parse("an unsigned integer")
    }

    /// Read a signed integer
    pub fn i32(&mut self) -> Result<i32> {
        self.parse("an integer")
    }

    /// Read a count
    pub fn usize(&mut self) -> Result<usize> {
        self.parse("a count")
    }

    /// Read a float
    pub fn f32(&mut self) -> Result<f32> {
        self.parse("a float")
    }

    /// Read `N` floats
    pub fn floats<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut out = [0.0; N];
        for slot in &mut out {
            *slot = self.f32()?;
        }
        Ok(out)
    }

    /// Read a value of a known kind
    pub fn value(&mut self, kind: ValueKind) -> Result<Value> {
        Ok(match kind {
            ValueKind::F32 => Value::F32(self.f32()?),
            ValueKind::I32 => Value::I32(self.i32()?),
            ValueKind::Vec2 => Value::Vec2(self.floats()?),
            ValueKind::Vec3 => Value::Vec3(self.floats()?),
            ValueKind::Vec4 => Value::Vec4(self.floats()?),
            ValueKind::Mat4 => Value::Mat4(self.floats()?),
        })
    }

    /// Read a required string
    pub fn word(&mut self) -> Result<String> {
        let token = self.token()?;
        decode_token(token).ok_or_else(|| self.error(format!("bad escape in '{token}'")))
    }

    /// Read an optional string, `-` meaning unset
    pub fn text(&mut self) -> Result<Option<String>> {
        let token = self.token()?;
        if token == NONE_TOKEN {
            return Ok(None);
        }
        decode_token(token)
            .map(Some)
            .ok_or_else(|| self.error(format!("bad escape in '{token}'")))
    }
}

/// Serialize a graph and its UI nodes
pub fn write_document<'n, I>(graph: &Graph, values: &ValueStore, nodes: I, root: Option<NodeId>) -> String
where
    I: IntoIterator<Item = &'n UiNode>,
    I::IntoIter: ExactSizeIterator,
{
    let mut out = RecordWriter::new();
    out.word(GRAPH_HEADER).new_line();
    out.u32(graph.next_id()).new_line();

    out.u32(graph.node_count() as u32).new_line();
    for (id, node) in graph.nodes() {
        out.word(NODE_TAG)
            .id(id)
            .u32(node.node_type.tag())
            .u32(node.direction.tag())
            .f32(node.value)
            .new_line();
    }

    out.u32(graph.edge_count() as u32).new_line();
    for edge in graph.edges() {
        out.word(EDGE_TAG)
            .u32(edge.id.0)
            .id(edge.from)
            .id(edge.to)
            .u32(edge.kind.tag())
            .new_line();
    }

    out.word(UI_HEADER).new_line();
    out.optional_id(root).new_line();
    let nodes = nodes.into_iter();
    out.u32(nodes.len() as u32).new_line();
    for node in nodes {
        out.word(UI_TAG).u32(node.kind().tag());
        node.serialize(values, &mut out);
        out.new_line();
    }

    out.finish()
}

/// A parsed document, not yet loaded into an editor
#[derive(Debug)]
pub struct LoadedDocument {
    /// Restored graph
    pub graph: Graph,
    /// Root node, if one was saved and exists
    pub root: Option<NodeId>,
    /// UI nodes in saved order. Value boxes are registered by `on_load`.
    pub nodes: Vec<UiNode>,
}

fn read_graph(reader: &mut RecordReader<'_>) -> Result<Graph> {
    reader.next_line()?;
    reader.expect(GRAPH_HEADER)?;
    reader.next_line()?;
    let next_id = reader.u32()?;

    let mut graph = Graph::new();
    reader.next_line()?;
    let node_count = reader.usize()?;
    for _ in 0..node_count {
        reader.next_line()?;
        reader.expect(NODE_TAG)?;
        let id = reader.id()?;
        let tag = reader.u32()?;
        let node_type =
            NodeType::from_tag(tag).ok_or_else(|| reader.error(format!("unknown node type {tag}")))?;
        let tag = reader.u32()?;
        let direction =
            Direction::from_tag(tag).ok_or_else(|| reader.error(format!("unknown direction {tag}")))?;
        let value = reader.f32()?;
        graph.restore_node(
            id,
            Node {
                node_type,
                direction,
                value,
            },
        )?;
    }

    reader.next_line()?;
    let edge_count = reader.usize()?;
    for _ in 0..edge_count {
        reader.next_line()?;
        reader.expect(EDGE_TAG)?;
        let id = EdgeId(reader.u32()?);
        let from = reader.id()?;
        let to = reader.id()?;
        let tag = reader.u32()?;
        let kind =
            EdgeKind::from_tag(tag).ok_or_else(|| reader.error(format!("unknown edge kind {tag}")))?;
        graph.restore_edge(Edge { id, from, to, kind })?;
    }

    graph.set_next_id(next_id);
    Ok(graph)
}

/// Check that a record only references nodes the graph section declared
fn references_resolve(graph: &Graph, node: &UiNode) -> bool {
    graph.node(node.id()).is_some_and(|n| !n.direction.is_pin())
        && node
            .pins()
            .into_iter()
            .all(|pin| graph.node(pin).is_some_and(|n| n.direction.is_pin()))
}

/// Parse a document.
///
/// Structural problems in the graph section fail the whole load. A `uin`
/// record with an unknown tag, bad fields or dangling pin ids is skipped
/// with a warning, together with its continuation lines.
pub fn read_document(text: &str) -> Result<LoadedDocument> {
    let mut reader = RecordReader::new(text);
    let graph = read_graph(&mut reader)?;

    reader.next_line()?;
    reader.expect(UI_HEADER)?;
    reader.next_line()?;
    let root = match reader.optional_id()? {
        Some(root) if !graph.contains_node(root) => {
            tracing::warn!("Saved root {root} is not in the graph, ignoring it");
            None
        }
        root => root,
    };

    reader.next_line()?;
    let count = reader.usize()?;
    let mut nodes: Vec<UiNode> = Vec::new();
    let mut owned = HashSet::new();
    for _ in 0..count {
        if reader.at_end() {
            tracing::warn!("Document ends before all {count} UI nodes were read");
            break;
        }
        reader.next_line()?;
        reader.expect(UI_TAG)?;
        let line = reader.line();
        let tag = reader.u32()?;

        let Some(kind) = UiNodeKind::from_tag(tag) else {
            tracing::warn!("Line {line}: skipping UI node with unknown type {tag}");
            reader.skip_until(UI_TAG);
            continue;
        };

        let node = match UiNode::deserialize(kind, &mut reader) {
            Ok(node) => node,
            Err(e) => {
                tracing::warn!("Line {line}: skipping {} node: {e}", kind.display_name());
                reader.skip_until(UI_TAG);
                continue;
            }
        };

        if !references_resolve(&graph, &node) || !owned.insert(node.id()) {
            tracing::warn!(
                "Line {line}: skipping {} node {} with unknown or shared ids",
                kind.display_name(),
                node.id()
            );
            continue;
        }
        nodes.push(node);
    }

    Ok(LoadedDocument { graph, root, nodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_encoding_round_trip() {
        for text in ["plain.hlsl", "my shaders/lit 2.hlsl", "100%", "tab\there", "ünï cödé"] {
            let token = encode_token(text);
            assert_eq!(token.split_whitespace().count(), 1);
            assert_eq!(decode_token(&token).as_deref(), Some(text));
        }
        assert_eq!(decode_token("%G1"), None);
        assert_eq!(decode_token("%4"), None);
    }

    #[test]
    fn test_optional_text_distinguishes_dash() {
        let mut out = RecordWriter::new();
        out.text(None).text(Some("-")).text(Some("a b"));
        let text = out.finish();
        assert_eq!(text, "- %2D a%20b\n");

        let mut reader = RecordReader::new(&text);
        reader.next_line().unwrap();
        assert_eq!(reader.text().unwrap(), None);
        assert_eq!(reader.text().unwrap().as_deref(), Some("-"));
        assert_eq!(reader.text().unwrap().as_deref(), Some("a b"));
    }

    #[test]
    fn test_reader_reports_line_numbers() {
        let mut reader = RecordReader::new("1 2\n\nthree\n");
        reader.next_line().unwrap();
        assert_eq!(reader.u32().unwrap(), 1);
        assert_eq!(reader.u32().unwrap(), 2);
        assert!(reader.u32().is_err());

        reader.next_line().unwrap();
        assert_eq!(reader.line(), 3);
        match reader.f32() {
            Err(PersistError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected a parse error, got {other:?}"),
        }
        assert!(reader.at_end());
        assert!(reader.next_line().is_err());
    }

    #[test]
    fn test_bare_graph_round_trip() {
        let mut graph = Graph::new();
        let a = graph.create_node(Node::new(NodeType::Value).with_value(0.1)).unwrap();
        let b = graph.create_node(Node::new(NodeType::Value).with_value(-2.5e-7)).unwrap();
        let sum = graph.create_node(Node::new(NodeType::Add)).unwrap();
        graph.create_edge(sum, a, EdgeKind::Internal).unwrap();
        let dropped = graph.create_edge(sum, b, EdgeKind::Internal).unwrap();
        graph.erase_edge(dropped).unwrap();
        graph.create_edge(sum, b, EdgeKind::External).unwrap();
        while graph.take_event().is_some() {}

        let text = write_document(&graph, &ValueStore::new(), std::iter::empty(), Some(sum));
        let loaded = read_document(&text).unwrap();

        assert_eq!(loaded.root, Some(sum));
        assert_eq!(loaded.graph.next_id(), graph.next_id());
        assert_eq!(loaded.graph.neighbors(sum), graph.neighbors(sum));
        let nodes: Vec<_> = graph.nodes().map(|(id, n)| (id, *n)).collect();
        let restored: Vec<_> = loaded.graph.nodes().map(|(id, n)| (id, *n)).collect();
        assert_eq!(nodes, restored);
        let edges: Vec<_> = graph.edges().copied().collect();
        let restored: Vec<_> = loaded.graph.edges().copied().collect();
        assert_eq!(edges, restored);
        assert!(!loaded.graph.has_pending_events());
    }

    #[test]
    fn test_unknown_ui_tag_is_skipped_with_continuation_lines() {
        let text = "#graph\n2\n2\nn 0 6 0 0\nn 1 10 1 0\n1\ne 2 0 1 0\n\
                    #ui_nodes\n0\n2\nuin 99 5 6\n7 extra line\nuin 16 0 1\n";
        let loaded = read_document(text).unwrap();
        assert_eq!(loaded.nodes.len(), 1);
        assert_eq!(loaded.nodes[0].kind(), UiNodeKind::RenderTarget);
        assert_eq!(loaded.root, Some(NodeId(0)));
        assert_eq!(loaded.graph.next_id(), 3);
    }

    #[test]
    fn test_dangling_ui_record_is_skipped() {
        let text = "#graph\n0\n1\nn 0 6 0 0\n0\n#ui_nodes\n-1\n1\nuin 16 0 42\n";
        let loaded = read_document(text).unwrap();
        assert!(loaded.nodes.is_empty());
        assert_eq!(loaded.root, None);
    }

    #[test]
    fn test_huge_counts_run_into_the_end_of_the_document() {
        let many_nodes = "#graph\n0\n0\n0\n#ui_nodes\n-1\n18446744073709551615\n";
        let loaded = read_document(many_nodes).unwrap();
        assert!(loaded.nodes.is_empty());

        let many_bindings = "#graph\n0\n0\n0\n#ui_nodes\n-1\n1\n\
                             uin 15 0 1 2 3 18446744073709551615 0 0 0\n";
        let loaded = read_document(many_bindings).unwrap();
        assert!(loaded.nodes.is_empty());
    }

    #[test]
    fn test_root_ids_beyond_i32_range() {
        let mut graph = Graph::new();
        let root = NodeId(3_000_000_000);
        graph.restore_node(root, Node::new(NodeType::RenderTarget)).unwrap();

        let text = write_document(&graph, &ValueStore::new(), std::iter::empty(), Some(root));
        assert_eq!(read_document(&text).unwrap().root, Some(root));

        let text = write_document(&graph, &ValueStore::new(), std::iter::empty(), None);
        assert_eq!(read_document(&text).unwrap().root, None);

        let dash = "#graph\n0\n0\n0\n#ui_nodes\n-\n0\n";
        assert_eq!(read_document(dash).unwrap().root, None);

        let too_big = "#graph\n0\n0\n0\n#ui_nodes\n4294967296\n0\n";
        assert!(matches!(
            read_document(too_big),
            Err(PersistError::Parse { line: 6, .. })
        ));
    }

    #[test]
    fn test_ids_at_the_top_of_the_range_fail_the_load() {
        let node = "#graph\n0\n1\nn 4294967295 0 0 0\n0\n#ui_nodes\n-1\n0\n";
        assert!(matches!(
            read_document(node),
            Err(PersistError::Graph(GraphError::IdSpaceExhausted))
        ));

        let edge = "#graph\n0\n1\nn 0 0 0 0\n1\ne 4294967295 0 0 0\n#ui_nodes\n-1\n0\n";
        assert!(matches!(
            read_document(edge),
            Err(PersistError::Graph(GraphError::IdSpaceExhausted))
        ));
    }

    #[test]
    fn test_structural_errors_fail_the_load() {
        let duplicate = "#graph\n0\n2\nn 0 0 0 0\nn 0 0 0 0\n0\n#ui_nodes\n-1\n0\n";
        assert!(matches!(
            read_document(duplicate),
            Err(PersistError::Graph(GraphError::DuplicateId(0)))
        ));

        let dangling = "#graph\n0\n1\nn 0 0 0 0\n1\ne 1 0 5 0\n#ui_nodes\n-1\n0\n";
        assert!(matches!(
            read_document(dangling),
            Err(PersistError::Graph(GraphError::NodeNotFound(NodeId(5))))
        ));

        assert!(matches!(
            read_document("#graph\n0\n1\n"),
            Err(PersistError::Parse { .. })
        ));
    }
}
