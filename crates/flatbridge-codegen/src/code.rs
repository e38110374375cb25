//! Line-oriented text builder for generated C and C++.

const INDENT: &str = "  ";

#[derive(Debug, Default)]
pub(crate) struct Code {
    out: String,
    depth: usize,
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line at the current indentation. Empty text gives a
    /// blank line without trailing spaces.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Append text verbatim, adding a newline if it lacks one.
    pub fn raw(&mut self, text: &str) {
        self.out.push_str(text);
        if !text.ends_with('\n') {
            self.out.push('\n');
        }
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Open a braced block: `header {`, then indent.
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.line(format!("{} {{", header.as_ref()));
        self.indent();
    }

    /// Close a braced block opened with [`Code::open`].
    pub fn close(&mut self, trailer: &str) {
        self.dedent();
        self.line(format!("}}{trailer}"));
    }

    /// Documentation in the `///` + `//` + `///` block style used across the
    /// generated headers.
    pub fn doc(&mut self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        self.line("///");
        for line in lines {
            if line.is_empty() {
                self.line("//");
            } else {
                self.line(format!("// {line}"));
            }
        }
        self.line("///");
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn finish(self) -> String {
        self.out
    }
}
