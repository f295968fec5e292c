//! Name allow-lists driving the syntactic tensor-call heuristics.
//!
//! All matching is exact comparison against the last dotted segment of a
//! call target (`torch.nn.functional.relu` matches "relu"). This is a
//! deliberate syntactic heuristic: no type information is consulted, and a
//! local variable named `model` will match the forward heuristic. Defaults
//! are modeled on PyTorch naming but every list is configurable.

use serde::{Deserialize, Serialize};

/// Configurable name sets consulted during fact extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamePolicy {
    /// Call names that construct tensors (`zeros`, `tensor`, ...).
    pub tensor_constructors: Vec<String>,
    /// Call names that operate on tensors (`matmul`, `cat`, ...).
    pub tensor_ops: Vec<String>,
    /// Calls that switch a model into evaluation mode.
    pub eval_markers: Vec<String>,
    /// `with`-context callables that disable gradient tracking.
    pub no_grad_markers: Vec<String>,
    /// Names whose invocation looks like a forward/inference pass.
    pub forward_patterns: Vec<String>,
    /// Calls that sever gradient tracking on their receiver's result.
    pub detach_markers: Vec<String>,
    /// Suffix marking an in-place operator method (PyTorch convention: `_`).
    pub inplace_suffix: String,
}

impl Default for NamePolicy {
    fn default() -> Self {
        Self {
            tensor_constructors: strings(&[
                "tensor",
                "as_tensor",
                "from_numpy",
                "zeros",
                "ones",
                "empty",
                "full",
                "rand",
                "randn",
                "randint",
                "arange",
                "linspace",
                "eye",
                "zeros_like",
                "ones_like",
                "randn_like",
            ]),
            tensor_ops: strings(&[
                "matmul", "mm", "bmm", "einsum", "cat", "stack", "conv2d", "relu", "softmax",
                "sigmoid", "tanh", "sum", "mean", "norm",
            ]),
            eval_markers: strings(&["eval"]),
            no_grad_markers: strings(&["no_grad", "inference_mode"]),
            forward_patterns: strings(&["forward", "predict", "model", "net"]),
            detach_markers: strings(&["detach", "numpy", "item", "tolist"]),
            inplace_suffix: "_".to_string(),
        }
    }
}

impl NamePolicy {
    /// Last dotted segment of a call target ("torch.zeros" -> "zeros").
    pub fn last_segment(target: &str) -> &str {
        target.rsplit('.').next().unwrap_or(target)
    }

    pub fn is_tensor_constructor(&self, target: &str) -> bool {
        let seg = Self::last_segment(target);
        self.tensor_constructors.iter().any(|n| n == seg)
    }

    pub fn is_tensor_op(&self, target: &str) -> bool {
        let seg = Self::last_segment(target);
        self.tensor_ops.iter().any(|n| n == seg)
    }

    pub fn is_eval_marker(&self, target: &str) -> bool {
        let seg = Self::last_segment(target);
        self.eval_markers.iter().any(|n| n == seg)
    }

    pub fn is_no_grad_marker(&self, target: &str) -> bool {
        let seg = Self::last_segment(target);
        self.no_grad_markers.iter().any(|n| n == seg)
    }

    pub fn matches_forward(&self, target: &str) -> bool {
        let seg = Self::last_segment(target);
        self.forward_patterns.iter().any(|n| n == seg)
    }

    pub fn is_detach_marker(&self, target: &str) -> bool {
        let seg = Self::last_segment(target);
        self.detach_markers.iter().any(|n| n == seg)
    }

    /// In-place operator heuristic: trailing suffix on the method name,
    /// dunder names excluded (`__init__` is not `add_`).
    pub fn is_inplace_name(&self, target: &str) -> bool {
        let seg = Self::last_segment(target);
        seg.len() > self.inplace_suffix.len()
            && seg.ends_with(&self.inplace_suffix)
            && !seg.ends_with("__")
    }
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
