//! Rendering helpers behind the containers' `Display` impls.

use std::fmt::Display;

use crate::list::{ListNode, ListNodeRef};
use crate::map::{TreeNode, TreeNodeRef};
use crate::structure::PersistentValue;
use crate::version::Version;

/// Render the subtree under `node` at version `v`, one node per line, with
/// box-drawing style guides.
pub(crate) fn render_tree<K, V>(
    node: &TreeNodeRef<K, V>,
    v: &Version,
    out: &mut String,
    prefix: &str,
    last: bool,
) where
    K: Clone + Display + 'static,
    V: PersistentValue,
{
    out.push_str(prefix);
    out.push_str(if last { "+-- " } else { "|-- " });
    out.push_str(&node.key.to_string());
    out.push('\n');

    let indent = format!("{prefix}{}", if last { "    " } else { "|   " });
    let left = TreeNode::get_left(node, v);
    let right = TreeNode::get_right(node, v);
    match (left, right) {
        (Some(left), Some(right)) => {
            render_tree(&left, v, out, &indent, false);
            render_tree(&right, v, out, &indent, true);
        }
        (Some(only), None) | (None, Some(only)) => render_tree(&only, v, out, &indent, true),
        (None, None) => {}
    }
}

/// Render a list head-to-tail at version `v`, one element per line.
pub(crate) fn render_list<T>(head: &ListNodeRef<T>, v: &Version) -> String
where
    T: PersistentValue + Display,
{
    let mut out = String::new();
    let mut current = Some(head.clone());
    while let Some(node) = current {
        out.push_str(&ListNode::read_value(&node, v).to_string());
        out.push('\n');
        current = ListNode::get_next(&node, v);
    }
    out
}
