use std::collections::HashMap;

use crate::ast::TypeDesc;
use crate::util::Stack;

/// Block-scoped variable table for the validator: a stack of `name → type`
/// mappings. Resolution scans from the innermost scope outwards, so
/// shadowing resolves to the nearest binding.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Stack<HashMap<String, TypeDesc>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_new_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn destroy_current_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn contains_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .peek()
            .is_some_and(|scope| scope.contains_key(name))
    }

    /// Bind a variable in the innermost scope.
    pub fn declare(&mut self, name: &str, ty: TypeDesc) {
        if let Some(scope) = self.scopes.peek_mut() {
            scope.insert(name.to_owned(), ty);
        }
    }

    pub fn find(&self, name: &str) -> Option<&TypeDesc> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing_resolves_to_innermost_binding() {
        let mut scopes = ScopeStack::new();
        scopes.create_new_scope();
        scopes.declare("x", TypeDesc::primitive("int").unwrap());
        scopes.create_new_scope();
        scopes.declare("x", TypeDesc::primitive("long").unwrap());

        assert_eq!(scopes.find("x").unwrap().name, "long");
        scopes.destroy_current_scope();
        assert_eq!(scopes.find("x").unwrap().name, "int");
    }

    #[test]
    fn test_current_scope_lookup_ignores_outer_scopes() {
        let mut scopes = ScopeStack::new();
        scopes.create_new_scope();
        scopes.declare("x", TypeDesc::int());
        scopes.create_new_scope();

        assert!(!scopes.contains_in_current_scope("x"));
        assert!(scopes.find("x").is_some());
    }
}
