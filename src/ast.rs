//! Script tree
//!
//! A parsed `.tesh` file is a flat, ordered list of nodes: standalone
//! comments, commands (with their expected streams) and blank-line spacers.
//! Every node can be dumped back to script syntax, and for any tree produced
//! by the parser `parse(dump(tree))` yields the same tree.

use std::fmt;
use std::path::PathBuf;

/// One of the three standard streams of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl Stream {
    /// The sigil introducing a data line for this stream
    pub fn sigil(self) -> &'static str {
        match self {
            Stream::Stdin => "<",
            Stream::Stdout => ">",
            Stream::Stderr => "2>",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdin => write!(f, "stdin"),
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// A suite of tests, usually every script found under one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suite {
    pub tests: Vec<Test>,
}

impl Suite {
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        for test in &self.tests {
            out.push_str(&test.name);
            out.push_str(":\n");
            out.push_str(&test.dump());
        }
        out
    }
}

/// A single script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Test {
    /// Display name, the script path relative to the suite root
    pub name: String,
    /// Source file, if the test was loaded from disk
    pub path: Option<PathBuf>,
    pub children: Vec<Node>,
}

impl Test {
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterate over the commands of the script, with their node index
    pub fn commands(&self) -> impl Iterator<Item = (usize, &CommandNode)> {
        self.children.iter().enumerate().filter_map(|(i, node)| match node {
            Node::Command(cmd) => Some((i, cmd)),
            _ => None,
        })
    }

    /// Serialize the tree back to script syntax
    pub fn dump(&self) -> String {
        self.children.iter().map(Node::dump).collect()
    }

    /// Overwrite the source file with the dumped tree
    pub fn write(&self) -> Result<(), std::io::Error> {
        let path = self.path.as_ref().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "writing a test requires a path",
            )
        })?;
        std::fs::write(path, self.dump())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Comment(CommentNode),
    Command(CommandNode),
    Spacer(SpacerNode),
}

impl Node {
    pub fn dump(&self) -> String {
        match self {
            Node::Comment(node) => node.dump(),
            Node::Command(node) => node.dump(),
            Node::Spacer(node) => node.dump(),
        }
    }
}

/// Commentary, possibly spanning several lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentNode {
    pub content: String,
}

impl CommentNode {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn dump(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        for line in self.content.split('\n') {
            if line.is_empty() {
                out.push('#');
            } else {
                out.push_str("# ");
                out.push_str(line);
            }
            out.push('\n');
        }
        out
    }
}

/// A run of blank lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpacerNode {
    pub lines: usize,
}

impl SpacerNode {
    pub fn dump(&self) -> String {
        "\n".repeat(self.lines)
    }
}

/// Accumulated content of one stream.
///
/// An empty `DataNode` is an explicit expectation of empty content (written
/// `>\`), which is not the same thing as a command without data lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataNode {
    pub content: String,
}

impl DataNode {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }

    pub fn append(&mut self, content: &str) {
        self.content.push_str(content);
    }

    /// Dump as data lines with the given stream's sigil. Content that does
    /// not end with a newline gets a trailing `\` on its last line.
    pub fn dump(&self, stream: Stream) -> String {
        let sigil = stream.sigil();
        let (body, newline) = match self.content.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (self.content.as_str(), false),
        };

        let mut out = String::new();
        for line in body.split('\n') {
            out.push_str(sigil);
            out.push_str(line);
            out.push('\n');
        }
        if !newline {
            out.pop();
            out.push_str("\\\n");
        }
        out
    }
}

/// One executable step of a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandNode {
    /// Comment written directly above the command
    pub comment: Option<CommentNode>,
    pub cmd: String,
    pub exit_code: i32,
    pub stdin: Option<DataNode>,
    pub stdout: Option<DataNode>,
    pub stderr: Option<DataNode>,
}

impl CommandNode {
    pub fn new(cmd: impl Into<String>, exit_code: i32) -> Self {
        Self {
            cmd: cmd.into(),
            exit_code,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cmd.is_empty()
    }

    pub fn stream(&self, stream: Stream) -> Option<&DataNode> {
        match stream {
            Stream::Stdin => self.stdin.as_ref(),
            Stream::Stdout => self.stdout.as_ref(),
            Stream::Stderr => self.stderr.as_ref(),
        }
    }

    pub fn stream_mut(&mut self, stream: Stream) -> &mut Option<DataNode> {
        match stream {
            Stream::Stdin => &mut self.stdin,
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }

    /// Expected content of a stream; a missing stream expects nothing.
    pub fn expected(&self, stream: Stream) -> &str {
        self.stream(stream).map_or("", |data| data.content.as_str())
    }

    /// Append data line content to a stream, creating it if needed
    pub fn append(&mut self, stream: Stream, content: &str) {
        self.stream_mut(stream)
            .get_or_insert_with(DataNode::default)
            .append(content);
    }

    /// The target of the built-in `cd <path>` command, unexpanded
    pub fn cd_target(&self) -> Option<&str> {
        self.cmd.strip_prefix("cd ").map(str::trim)
    }

    pub fn dump(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        if let Some(ref comment) = self.comment {
            out.push_str(&comment.dump());
        }
        if self.exit_code != 0 {
            out.push_str(&self.exit_code.to_string());
        }
        out.push_str("$ ");
        out.push_str(&self.cmd);
        out.push('\n');
        for stream in [Stream::Stdin, Stream::Stdout, Stream::Stderr] {
            if let Some(data) = self.stream(stream) {
                out.push_str(&data.dump(stream));
            }
        }
        out
    }
}
