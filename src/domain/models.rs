use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity assigned to a [`Function`] at extraction time.
pub type FunctionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Language {
    C,
    Cpp,
    Java,
    Python,
    Go,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::Go => "go",
        };
        f.write_str(s)
    }
}

/// A function extracted from a source file. Identity is the (file, name, range) triple
/// it was interned on; `id` is a stable handle used everywhere else.
#[derive(Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub file: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub code: String,
}

impl Function {
    pub fn new(
        id: FunctionId,
        name: impl Into<String>,
        file: impl Into<String>,
        start_line: usize,
        end_line: usize,
        start_byte: usize,
        end_byte: usize,
        code: impl Into<String>,
    ) -> Self {
        debug_assert!(start_line <= end_line, "function range must be non-empty");
        Function {
            id,
            name: name.into(),
            file: file.into(),
            start_line,
            end_line,
            start_byte,
            end_byte,
            code: code.into(),
        }
    }

    /// Converts an absolute (1-based, file-wide) line number to a line number relative to
    /// this function's first line. Used when building oracle inputs, which are always
    /// function-relative.
    pub fn file_line_to_function_line(&self, file_line: usize) -> usize {
        file_line.saturating_sub(self.start_line) + 1
    }

    pub fn function_line_to_file_line(&self, function_line: usize) -> usize {
        self.start_line + function_line.saturating_sub(1)
    }

    pub fn contains_line(&self, file_line: usize) -> bool {
        file_line >= self.start_line && file_line <= self.end_line
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.file == other.file
            && self.start_line == other.start_line
            && self.end_line == other.end_line
    }
}
impl Eq for Function {}

impl std::hash::Hash for Function {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.file.hash(state);
        self.start_line.hash(state);
        self.end_line.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueLabel {
    Src,
    Sink,
    Para,
    Ret,
    Arg,
    Out,
    BufAccessExpr,
    NonBufAccessExpr,
    Local,
    Global,
}

/// A location-tagged program datum. Equality/hashing is over the full tuple, matching the
/// string-serialization equality the propagation engine relies on to dedupe frontiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    pub name: String,
    pub line_number: usize,
    pub label: ValueLabel,
    pub file: String,
    /// Positional slot for PARA/ARG/RET; -1 otherwise.
    pub index: i32,
}

impl Value {
    pub fn new(
        name: impl Into<String>,
        line_number: usize,
        label: ValueLabel,
        file: impl Into<String>,
    ) -> Self {
        Value {
            name: name.into(),
            line_number,
            label,
            file: file.into(),
            index: -1,
        }
    }

    pub fn with_index(mut self, index: i32) -> Self {
        self.index = index;
        self
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{} ({:?}, idx={})",
            self.name, self.file, self.line_number, self.label, self.index
        )
    }
}

/// An external (non-user-defined) callee, interned by (name, arity).
#[derive(Debug, Clone)]
pub struct Api {
    pub name: String,
    pub para_num: usize,
}

impl Api {
    pub fn new(name: impl Into<String>, para_num: usize) -> Self {
        Api {
            name: name.into(),
            para_num,
        }
    }
}

impl PartialEq for Api {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.para_num == other.para_num
    }
}
impl Eq for Api {}

impl std::hash::Hash for Api {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.para_num.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_line_round_trip() {
        let f = Function::new(0, "foo", "a.c", 10, 20, 0, 10, "...");
        assert_eq!(f.file_line_to_function_line(10), 1);
        assert_eq!(f.function_line_to_file_line(1), 10);
        assert_eq!(f.file_line_to_function_line(15), 6);
        assert!(f.contains_line(10));
        assert!(f.contains_line(20));
        assert!(!f.contains_line(21));
    }

    #[test]
    fn api_equality_ignores_name_case_nothing_just_exact() {
        let a = Api::new("free", 1);
        let b = Api::new("free", 1);
        let c = Api::new("free", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn value_display_includes_label_and_index() {
        let v = Value::new("x", 5, ValueLabel::Arg, "a.c").with_index(2);
        let s = format!("{v}");
        assert!(s.contains("Arg"));
        assert!(s.contains("idx=2"));
    }
}
