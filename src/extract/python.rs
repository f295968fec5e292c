//! Python fact extraction using tree-sitter.
//!
//! A single pre-order walk over the tree produces every fact category in
//! source order while tracking lexical context: the enclosing function, the
//! innermost enclosing loop, and whether the position sits inside a no-grad
//! `with` block. Semantically unusual but syntactically legal constructs
//! never fail extraction; only genuine syntax errors do.

use tree_sitter::{Node, Parser};

use crate::error::ParseErrorKind;
use crate::extract::facts::{
    ArgExpr, CallFact, ClassFact, FactSet, FunctionFact, ImportFact, LoopFact, LoopKind,
    MutationFact, MutationKind, Span, TensorCallFact, TensorCallKind,
};
use crate::extract::policy::NamePolicy;

/// Parse source text and derive its fact set.
///
/// Pure function over the text: no I/O, no shared state. Fails with
/// [`ParseErrorKind::Syntax`] carrying the first error node's location when
/// the text is not valid Python.
pub fn extract(source: &str, policy: &NamePolicy) -> Result<FactSet, ParseErrorKind> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ParseErrorKind::Parser(e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseErrorKind::Parser("parser produced no tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(match first_error_node(root) {
            Some(node) => {
                let pos = node.start_position();
                ParseErrorKind::Syntax {
                    line: pos.row + 1,
                    column: pos.column + 1,
                }
            }
            None => ParseErrorKind::Syntax { line: 0, column: 0 },
        });
    }

    let mut walker = Walker {
        source: source.as_bytes(),
        policy,
        facts: FactSet {
            source_lines: source.lines().count(),
            ..FactSet::default()
        },
    };
    walker.walk(root, Ctx::default());
    Ok(walker.facts)
}

/// Find the first ERROR or missing node in document order.
fn first_error_node(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error_node(child) {
            return Some(found);
        }
    }
    None
}

/// Lexical context carried down the walk.
#[derive(Debug, Clone, Copy, Default)]
struct Ctx {
    function: Option<usize>,
    enclosing_loop: Option<usize>,
    no_grad: bool,
}

struct Walker<'a> {
    source: &'a [u8],
    policy: &'a NamePolicy,
    facts: FactSet,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node) -> &str {
        node.utf8_text(self.source).unwrap_or("")
    }

    fn walk(&mut self, node: Node, ctx: Ctx) {
        match node.kind() {
            "function_definition" => self.on_function(node, ctx),
            "class_definition" => self.on_class(node, ctx),
            "import_statement" => self.on_import(node),
            "import_from_statement" => self.on_import_from(node),
            "for_statement" => self.on_for(node, ctx),
            "while_statement" => self.on_while(node, ctx),
            "with_statement" => self.on_with(node, ctx),
            "call" => {
                self.on_call(node, ctx);
                self.walk_children(node, ctx);
            }
            "assignment" => {
                self.on_assignment(node, ctx);
                self.walk_children(node, ctx);
            }
            "augmented_assignment" => {
                self.on_aug_assignment(node, ctx);
                self.walk_children(node, ctx);
            }
            _ => self.walk_children(node, ctx),
        }
    }

    fn walk_children(&mut self, node: Node, ctx: Ctx) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child, ctx);
        }
    }

    fn on_function(&mut self, node: Node, _ctx: Ctx) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();

        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.param_names(p))
            .unwrap_or_default();

        let body = match node.child_by_field_name("body") {
            Some(b) => b,
            None => return,
        };

        let id = self.facts.functions.len();
        self.facts.functions.push(FunctionFact {
            id,
            name,
            params,
            span: Span::from_node(node),
            body: Span::from_node(body),
        });

        // The body executes in its own scope: loop and no-grad context from
        // the definition site do not carry over to call time.
        self.walk_children(
            body,
            Ctx {
                function: Some(id),
                enclosing_loop: None,
                no_grad: false,
            },
        );
    }

    fn param_names(&self, parameters: Node) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = parameters.walk();
        for param in parameters.named_children(&mut cursor) {
            match param.kind() {
                "identifier" => names.push(self.text(param).to_string()),
                _ => {
                    if let Some(name) = param
                        .child_by_field_name("name")
                        .or_else(|| first_identifier(param))
                    {
                        names.push(self.text(name).to_string());
                    }
                }
            }
        }
        names
    }

    fn on_class(&mut self, node: Node, ctx: Ctx) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        self.facts.classes.push(ClassFact {
            name,
            span: Span::from_node(node),
        });
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_children(body, ctx);
        }
    }

    fn on_import(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "dotted_name" => self.facts.imports.push(ImportFact {
                    module: self.text(child).to_string(),
                    alias: None,
                    span: Span::from_node(node),
                }),
                "aliased_import" => {
                    let module = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|n| self.text(n).to_string());
                    self.facts.imports.push(ImportFact {
                        module,
                        alias,
                        span: Span::from_node(node),
                    });
                }
                _ => {}
            }
        }
    }

    fn on_import_from(&mut self, node: Node) {
        if let Some(module) = node.child_by_field_name("module_name") {
            self.facts.imports.push(ImportFact {
                module: self.text(module).to_string(),
                alias: None,
                span: Span::from_node(node),
            });
        }
    }

    fn on_for(&mut self, node: Node, ctx: Ctx) {
        let body = match node.child_by_field_name("body") {
            Some(b) => b,
            None => return,
        };

        let induction_vars = node
            .child_by_field_name("left")
            .map(|left| collect_identifiers(left, self.source))
            .unwrap_or_default();

        // The iterable expression evaluates once, outside the body.
        if let Some(right) = node.child_by_field_name("right") {
            self.walk(right, ctx);
        }

        let id = self.facts.loops.len();
        self.facts.loops.push(LoopFact {
            id,
            kind: LoopKind::For,
            body: Span::from_node(body),
            induction_vars,
            enclosing_function: ctx.function,
        });

        self.walk_children(
            body,
            Ctx {
                enclosing_loop: Some(id),
                ..ctx
            },
        );
    }

    fn on_while(&mut self, node: Node, ctx: Ctx) {
        let body = match node.child_by_field_name("body") {
            Some(b) => b,
            None => return,
        };

        if let Some(condition) = node.child_by_field_name("condition") {
            self.walk(condition, ctx);
        }

        let id = self.facts.loops.len();
        self.facts.loops.push(LoopFact {
            id,
            kind: LoopKind::While,
            body: Span::from_node(body),
            induction_vars: Vec::new(),
            enclosing_function: ctx.function,
        });

        self.walk_children(
            body,
            Ctx {
                enclosing_loop: Some(id),
                ..ctx
            },
        );
    }

    fn on_with(&mut self, node: Node, ctx: Ctx) {
        let mut no_grad = ctx.no_grad;
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "with_clause" {
                continue;
            }
            let mut item_cursor = child.walk();
            for item in child.named_children(&mut item_cursor) {
                let value = item.child_by_field_name("value").unwrap_or(item);
                let expr = if value.kind() == "as_pattern" {
                    value.child(0).unwrap_or(value)
                } else {
                    value
                };
                if expr.kind() == "call" {
                    if let Some(function) = expr.child_by_field_name("function") {
                        if self.policy.is_no_grad_marker(self.text(function)) {
                            no_grad = true;
                        }
                    }
                }
            }
            // Context-manager expressions are ordinary calls too.
            self.walk(child, ctx);
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.walk_children(body, Ctx { no_grad, ..ctx });
        }
    }

    fn on_call(&mut self, node: Node, ctx: Ctx) {
        let function = match node.child_by_field_name("function") {
            Some(f) => f,
            None => return,
        };
        let target = self.text(function).to_string();
        let pos = node.start_position();
        let line = pos.row + 1;
        let column = pos.column + 1;

        self.facts.calls.push(CallFact {
            target: target.clone(),
            enclosing_function: ctx.function,
            line,
            column,
            is_eval_marker: self.policy.is_eval_marker(&target),
            in_no_grad: ctx.no_grad,
            matches_forward: self.policy.matches_forward(&target),
        });

        let kind = if self.policy.is_tensor_constructor(&target) {
            Some(TensorCallKind::Constructor)
        } else if self.policy.is_tensor_op(&target) {
            Some(TensorCallKind::Operation)
        } else {
            None
        };
        if let Some(kind) = kind {
            let args = node
                .child_by_field_name("arguments")
                .map(|a| self.call_args(a))
                .unwrap_or_default();
            self.facts.tensor_calls.push(TensorCallFact {
                target: target.clone(),
                kind,
                args,
                enclosing_function: ctx.function,
                enclosing_loop: ctx.enclosing_loop,
                line,
                column,
            });
        }

        // In-place mutation: `x.add_(...)` on a plain identifier receiver.
        if function.kind() == "attribute" && self.policy.is_inplace_name(&target) {
            if let Some(object) = function.child_by_field_name("object") {
                if object.kind() == "identifier" {
                    self.facts.mutations.push(MutationFact {
                        target: self.text(object).to_string(),
                        kind: MutationKind::InPlaceCall,
                        call_target: Some(target),
                        rhs_identifiers: Vec::new(),
                        produces_tensor: false,
                        breaks_tracking: false,
                        line,
                        column,
                        span: Span::from_node(node),
                        enclosing_function: ctx.function,
                    });
                }
            }
        }
    }

    fn call_args(&self, argument_list: Node) -> Vec<ArgExpr> {
        let mut args = Vec::new();
        let mut cursor = argument_list.walk();
        for arg in argument_list.named_children(&mut cursor) {
            if arg.kind() == "comment" {
                continue;
            }
            if arg.kind() == "keyword_argument" {
                let keyword = arg
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string());
                let value = arg.child_by_field_name("value").unwrap_or(arg);
                args.push(ArgExpr {
                    text: self.text(value).to_string(),
                    keyword,
                    identifiers: collect_identifiers(value, self.source),
                });
            } else {
                args.push(ArgExpr {
                    text: self.text(arg).to_string(),
                    keyword: None,
                    identifiers: collect_identifiers(arg, self.source),
                });
            }
        }
        args
    }

    fn on_assignment(&mut self, node: Node, ctx: Ctx) {
        let left = match node.child_by_field_name("left") {
            Some(l) => l,
            None => return,
        };
        // Annotated declarations without a value (`x: Tensor`) bind nothing.
        let right = match node.child_by_field_name("right") {
            Some(r) => r,
            None => return,
        };

        let rhs_identifiers = collect_identifiers(right, self.source);
        let (call_target, produces_tensor, breaks_tracking) = self.classify_rhs(right);
        let span = Span::from_node(node);
        let pos = node.start_position();

        for target in assignment_targets(left, self.source) {
            self.facts.mutations.push(MutationFact {
                target,
                kind: MutationKind::Assign,
                call_target: call_target.clone(),
                rhs_identifiers: rhs_identifiers.clone(),
                produces_tensor,
                breaks_tracking,
                line: pos.row + 1,
                column: pos.column + 1,
                span,
                enclosing_function: ctx.function,
            });
        }
    }

    fn on_aug_assignment(&mut self, node: Node, ctx: Ctx) {
        let left = match node.child_by_field_name("left") {
            Some(l) => l,
            None => return,
        };
        if left.kind() != "identifier" {
            return;
        }
        let rhs_identifiers = node
            .child_by_field_name("right")
            .map(|r| collect_identifiers(r, self.source))
            .unwrap_or_default();
        let pos = node.start_position();
        self.facts.mutations.push(MutationFact {
            target: self.text(left).to_string(),
            kind: MutationKind::AugAssign,
            call_target: None,
            rhs_identifiers,
            produces_tensor: false,
            breaks_tracking: false,
            line: pos.row + 1,
            column: pos.column + 1,
            span: Span::from_node(node),
            enclosing_function: ctx.function,
        });
    }

    /// Classify an assignment RHS: call target if it is a call, whether the
    /// call produces a gradient-tracked tensor, whether it severs tracking.
    fn classify_rhs(&self, right: Node) -> (Option<String>, bool, bool) {
        if right.kind() != "call" {
            return (None, false, false);
        }
        let target = match right.child_by_field_name("function") {
            Some(f) => self.text(f).to_string(),
            None => return (None, false, false),
        };

        let requires_grad = right
            .child_by_field_name("arguments")
            .map(|args| self.has_requires_grad(args))
            .unwrap_or(false);

        let produces = self.policy.is_tensor_constructor(&target)
            || self.policy.is_tensor_op(&target)
            || requires_grad;
        let breaks = self.policy.is_detach_marker(&target);
        (Some(target), produces, breaks)
    }

    fn has_requires_grad(&self, argument_list: Node) -> bool {
        let mut cursor = argument_list.walk();
        for arg in argument_list.named_children(&mut cursor) {
            if arg.kind() != "keyword_argument" {
                continue;
            }
            let name = arg.child_by_field_name("name").map(|n| self.text(n));
            let value = arg.child_by_field_name("value").map(|n| self.text(n));
            if name == Some("requires_grad") && value == Some("True") {
                return true;
            }
        }
        false
    }
}

/// Identifier names assignable from a target pattern: `x`, `x, y`, `(a, b)`.
/// Attribute and subscript targets are skipped; they do not bind local names.
fn assignment_targets(node: Node, source: &[u8]) -> Vec<String> {
    match node.kind() {
        "identifier" => vec![node.utf8_text(source).unwrap_or("").to_string()],
        "pattern_list" | "tuple_pattern" | "list_pattern" => {
            let mut names = Vec::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                names.extend(assignment_targets(child, source));
            }
            names
        }
        _ => Vec::new(),
    }
}

/// Free identifiers in an expression.
///
/// Attribute accesses only contribute their object (`a.b` yields `a`, not
/// `b`) and keyword-argument names are not identifiers, so the result is
/// suitable for the loop-invariance free-variable scan.
fn collect_identifiers(node: Node, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    collect_identifiers_into(node, source, &mut out);
    out
}

fn collect_identifiers_into(node: Node, source: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "identifier" => {
            let name = node.utf8_text(source).unwrap_or("").to_string();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        "attribute" => {
            if let Some(object) = node.child_by_field_name("object") {
                collect_identifiers_into(object, source, out);
            }
        }
        "keyword_argument" => {
            if let Some(value) = node.child_by_field_name("value") {
                collect_identifiers_into(value, source, out);
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_identifiers_into(child, source, out);
            }
        }
    }
}

fn first_identifier(node: Node) -> Option<Node> {
    if node.kind() == "identifier" {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    for child in children {
        if let Some(found) = first_identifier(child) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(source: &str) -> FactSet {
        extract(source, &NamePolicy::default()).unwrap()
    }

    #[test]
    fn test_syntax_error_location() {
        let err = extract("def broken(:\n    pass\n", &NamePolicy::default()).unwrap_err();
        match err {
            ParseErrorKind::Syntax { line, .. } => assert_eq!(line, 1),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_functions_and_imports() {
        let f = facts(
            r#"
import torch
import numpy as np
from torch import nn

def train(model, data):
    pass

class Trainer:
    def step(self, batch):
        pass
"#,
        );
        assert_eq!(f.imports.len(), 3);
        assert_eq!(f.imports[1].alias.as_deref(), Some("np"));
        assert_eq!(f.functions.len(), 2);
        assert_eq!(f.functions[0].name, "train");
        assert_eq!(f.functions[0].params, vec!["model", "data"]);
        assert_eq!(f.functions[1].name, "step");
        assert_eq!(f.classes.len(), 1);
        assert_eq!(f.classes[0].name, "Trainer");
    }

    #[test]
    fn test_tensor_call_in_loop() {
        let f = facts(
            r#"
import torch
for i in range(10):
    t = torch.zeros(3, 3)
"#,
        );
        assert_eq!(f.loops.len(), 1);
        assert_eq!(f.loops[0].induction_vars, vec!["i"]);
        assert_eq!(f.tensor_calls.len(), 1);
        let tc = &f.tensor_calls[0];
        assert_eq!(tc.target, "torch.zeros");
        assert_eq!(tc.kind, TensorCallKind::Constructor);
        assert_eq!(tc.enclosing_loop, Some(0));
        assert_eq!(tc.args.len(), 2);
    }

    #[test]
    fn test_iterable_is_outside_loop_body() {
        let f = facts("for x in torch.randn(4):\n    y = x\n");
        // randn appears in the iterable, which runs once
        assert_eq!(f.tensor_calls.len(), 1);
        assert_eq!(f.tensor_calls[0].enclosing_loop, None);
    }

    #[test]
    fn test_inplace_mutation_fact() {
        let f = facts("x = torch.tensor(data)\nx.add_(1)\n");
        let assigns: Vec<_> = f
            .mutations
            .iter()
            .filter(|m| m.kind == MutationKind::Assign)
            .collect();
        assert_eq!(assigns.len(), 1);
        assert!(assigns[0].produces_tensor);

        let inplace: Vec<_> = f
            .mutations
            .iter()
            .filter(|m| m.kind == MutationKind::InPlaceCall)
            .collect();
        assert_eq!(inplace.len(), 1);
        assert_eq!(inplace[0].target, "x");
        assert_eq!(inplace[0].call_target.as_deref(), Some("x.add_"));
    }

    #[test]
    fn test_no_grad_context() {
        let f = facts(
            r#"
import torch
with torch.no_grad():
    out = model(batch)
probs = model(batch)
"#,
        );
        let forwards: Vec<_> = f.calls.iter().filter(|c| c.matches_forward).collect();
        assert_eq!(forwards.len(), 2);
        assert!(forwards[0].in_no_grad);
        assert!(!forwards[1].in_no_grad);
    }

    #[test]
    fn test_function_body_resets_loop_context() {
        let f = facts(
            r#"
for i in range(3):
    def inner():
        t = torch.zeros(2)
"#,
        );
        assert_eq!(f.tensor_calls.len(), 1);
        // The call belongs to inner(), not to the loop that defines it.
        assert_eq!(f.tensor_calls[0].enclosing_loop, None);
        assert_eq!(f.tensor_calls[0].enclosing_function, Some(0));
    }

    #[test]
    fn test_argument_identifiers() {
        let f = facts("t = torch.zeros(n, cfg.dim, dtype=dt)\n");
        let args = &f.tensor_calls[0].args;
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].identifiers, vec!["n"]);
        // attribute access contributes only the object name
        assert_eq!(args[1].identifiers, vec!["cfg"]);
        assert_eq!(args[2].keyword.as_deref(), Some("dtype"));
        assert_eq!(args[2].identifiers, vec!["dt"]);
    }

    #[test]
    fn test_tuple_assignment_targets() {
        let f = facts("a, b = load()\n");
        let targets: Vec<_> = f.mutations.iter().map(|m| m.target.as_str()).collect();
        assert_eq!(targets, vec!["a", "b"]);
    }

    #[test]
    fn test_detach_breaks_tracking() {
        let f = facts("y = x.detach()\n");
        assert!(f.mutations[0].breaks_tracking);
        assert!(!f.mutations[0].produces_tensor);
    }
}
