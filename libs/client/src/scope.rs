//! Scope tree for conditional nesting, as an index-based arena.
//!
//! One node per conditional body plus one root per MIX program. Each node
//! has exactly one parent except roots. The tree exists only for
//! client-side liveness analysis and is never serialized. Ancestor queries
//! walk parent links; tree depth equals conditional nesting depth, so the
//! walk is as good as O(1) in practice.

/// Index of a scope node inside its [`ScopeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// Arena of scope nodes. Nodes are never removed; a builder keeps one
/// arena for its lifetime and pushes a fresh root per MIX program.
#[derive(Debug, Default)]
pub struct ScopeArena {
    parents: Vec<Option<ScopeId>>,
}

impl ScopeArena {
    /// Add a root node (no parent).
    pub fn push_root(&mut self) -> ScopeId {
        self.parents.push(None);
        ScopeId(self.parents.len() - 1)
    }

    /// Add a child of `parent`.
    pub fn push_child(&mut self, parent: ScopeId) -> ScopeId {
        self.parents.push(Some(parent));
        ScopeId(self.parents.len() - 1)
    }

    pub fn parent(&self, node: ScopeId) -> Option<ScopeId> {
        self.parents[node.0]
    }

    /// Strict ancestor test: walks parent links from `node`.
    pub fn is_ancestor(&self, ancestor: ScopeId, node: ScopeId) -> bool {
        let mut current = self.parent(node);
        while let Some(scope) = current {
            if scope == ancestor {
                return true;
            }
            current = self.parent(scope);
        }
        false
    }

    /// Whether `a` and `b` sit on one root-to-leaf path (equal, ancestor,
    /// or descendant). Scopes on different branches are unrelated.
    pub fn related(&self, a: ScopeId, b: ScopeId) -> bool {
        a == b || self.is_ancestor(a, b) || self.is_ancestor(b, a)
    }
}
