use serde::{Deserialize, Serialize};

use super::models::FunctionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parenthesis {
    Left,
    Right,
}

/// One unit of calling-context history: which call site, in which function, was crossed
/// and in which direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextLabel {
    pub file: String,
    pub line: usize,
    pub function_id: FunctionId,
    pub parenthesis: Parenthesis,
}

impl ContextLabel {
    pub fn new(file: impl Into<String>, line: usize, function_id: FunctionId, parenthesis: Parenthesis) -> Self {
        ContextLabel {
            file: file.into(),
            line,
            function_id,
            parenthesis,
        }
    }

    /// Two labels "match" as a call/return pair when they denote the same call site
    /// (same file, line and function) regardless of direction.
    fn same_site(&self, other: &ContextLabel) -> bool {
        self.file == other.file && self.line == other.line && self.function_id == other.function_id
    }
}

/// A context-free-language balanced-parenthesis calling context, tracked two ways:
/// `context` is the full ordered history (used for diagnostics / reporting), while
/// `simplified_context` is the reduced stack actually used to gate CFL-reachability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CallContext {
    pub context: Vec<ContextLabel>,
    pub simplified_context: Vec<ContextLabel>,
    pub backward: bool,
}

impl CallContext {
    pub fn new(backward: bool) -> Self {
        CallContext {
            context: Vec::new(),
            simplified_context: Vec::new(),
            backward,
        }
    }

    pub fn depth(&self) -> usize {
        self.simplified_context.len()
    }

    /// The opening parenthesis in this context's direction. Forward contexts open on
    /// Left (entering a callee); backward contexts open on Right (entering a caller).
    fn opening(&self) -> Parenthesis {
        if self.backward {
            Parenthesis::Right
        } else {
            Parenthesis::Left
        }
    }

    /// Attempts to extend this context with `label`. Returns the extended context on
    /// success, or `None` if the extension is not CFL-reachable (a close that doesn't
    /// match the top of the stack).
    pub fn add_and_check_context(&self, label: ContextLabel) -> Option<CallContext> {
        let mut next = self.clone();
        next.context.push(label.clone());

        if label.parenthesis == self.opening() {
            next.simplified_context.push(label);
            Some(next)
        } else {
            match next.simplified_context.last() {
                Some(top) if top.same_site(&label) => {
                    next.simplified_context.pop();
                    Some(next)
                }
                None => {
                    // Closing with nothing open is only reachable at depth 0 if we
                    // allow unmatched returns through (not CFL-sound); reject instead.
                    None
                }
                Some(_) => None,
            }
        }
    }

    pub fn top_unmatched(&self) -> Option<&ContextLabel> {
        self.simplified_context.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(line: usize, par: Parenthesis) -> ContextLabel {
        ContextLabel::new("a.c", line, 1, par)
    }

    #[test]
    fn matching_call_then_return_empties_the_stack() {
        let ctx = CallContext::new(false);
        let ctx = ctx.add_and_check_context(label(10, Parenthesis::Left)).unwrap();
        assert_eq!(ctx.depth(), 1);
        let ctx = ctx.add_and_check_context(label(10, Parenthesis::Right)).unwrap();
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn mismatched_return_is_rejected() {
        let ctx = CallContext::new(false);
        let ctx = ctx.add_and_check_context(label(10, Parenthesis::Left)).unwrap();
        let rejected = ctx.add_and_check_context(label(99, Parenthesis::Right));
        assert!(rejected.is_none());
    }

    #[test]
    fn unmatched_return_at_depth_zero_is_rejected() {
        let ctx = CallContext::new(false);
        assert!(ctx.add_and_check_context(label(10, Parenthesis::Right)).is_none());
    }

    #[test]
    fn backward_context_opens_on_right() {
        let ctx = CallContext::new(true);
        let ctx = ctx.add_and_check_context(label(5, Parenthesis::Right)).unwrap();
        assert_eq!(ctx.depth(), 1);
        let ctx = ctx.add_and_check_context(label(5, Parenthesis::Left)).unwrap();
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn nested_calls_stack_and_unwind_in_order() {
        let ctx = CallContext::new(false);
        let ctx = ctx
            .add_and_check_context(ContextLabel::new("a.c", 1, 1, Parenthesis::Left))
            .unwrap();
        let ctx = ctx
            .add_and_check_context(ContextLabel::new("a.c", 2, 2, Parenthesis::Left))
            .unwrap();
        assert_eq!(ctx.depth(), 2);
        // must close innermost first
        let rejected = ctx.clone().add_and_check_context(ContextLabel::new("a.c", 1, 1, Parenthesis::Right));
        assert!(rejected.is_none());
        let ctx = ctx
            .add_and_check_context(ContextLabel::new("a.c", 2, 2, Parenthesis::Right))
            .unwrap();
        assert_eq!(ctx.depth(), 1);
    }
}
