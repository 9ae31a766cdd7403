//! Separator-delimited namespace tree for one value type
//!
//! Keys are split after every separator byte: `"user:42:name"` becomes the
//! path steps `"user:"`, `"42:"` and the terminal segment `"name"`. Every node
//! carries the number of keys and the summed size of its subtree, so any
//! prefix can be answered from a single node.
//!
//! ```text
//!                 root (hash)   keys=3 size=6
//!                      │
//!                   "foo:"      keys=3 size=6
//!            ┌─────────┼──────────┐
//!         "bar"      "bar:"     "qux"
//!        size=1      size=2     size=3
//!                      │
//!                    "baz"
//!                    size=2
//! ```

use std::collections::HashMap;
use std::mem;

/// Set of single-byte key separators
#[derive(Clone, PartialEq, Eq)]
pub struct Separators {
    table: [bool; 256],
}

impl Separators {
    /// Build from raw bytes
    pub fn new(bytes: &[u8]) -> Self {
        let mut table = [false; 256];
        for &b in bytes {
            table[b as usize] = true;
        }
        Self { table }
    }

    #[inline]
    pub fn contains(&self, byte: u8) -> bool {
        self.table[byte as usize]
    }

    /// The configured separator bytes, ascending
    pub fn bytes(&self) -> Vec<u8> {
        (0..=255u8).filter(|&b| self.contains(b)).collect()
    }

    fn ends_with_separator(&self, s: &str) -> bool {
        s.as_bytes().last().is_some_and(|&b| self.contains(b))
    }

    /// Split a key into its path steps (each ending in a separator) and the
    /// terminal remainder, which is empty when the key ends in a separator.
    pub fn split<'a>(&self, key: &'a str) -> (Vec<&'a str>, &'a str) {
        let mut steps = Vec::new();
        let mut start = 0;
        for (i, &b) in key.as_bytes().iter().enumerate() {
            if self.contains(b) {
                steps.push(&key[start..=i]);
                start = i + 1;
            }
        }
        (steps, &key[start..])
    }

    /// First path step of `s`, up to and including the first separator
    fn first_step<'a>(&self, s: &'a str) -> Option<&'a str> {
        s.as_bytes()
            .iter()
            .position(|&b| self.contains(b))
            .map(|i| &s[..=i])
    }
}

impl std::fmt::Debug for Separators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chars: String = self.bytes().into_iter().map(char::from).collect();
        f.debug_tuple("Separators").field(&chars).finish()
    }
}

/// A path segment, a full key, or both
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    segment: String,
    key_count: u64,
    size: i64,
    own: Option<i64>,
    children: HashMap<String, Node>,
}

impl Node {
    fn with_segment(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            ..Default::default()
        }
    }

    /// Literal text this node contributes to the key path
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Number of keys in this subtree, including this node if it is a key
    pub fn key_count(&self) -> u64 {
        self.key_count
    }

    /// Summed size of every key in this subtree
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Size of the key ending exactly at this node, if any
    pub fn own_size(&self) -> Option<i64> {
        self.own
    }

    pub fn is_terminal(&self) -> bool {
        self.own.is_some()
    }

    pub fn children(&self) -> &HashMap<String, Node> {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Children ordered by segment text
    pub fn sorted_children(&self) -> Vec<&Node> {
        let mut children: Vec<&Node> = self.children.values().collect();
        children.sort_by(|a, b| a.segment.cmp(&b.segment));
        children
    }

    /// Check the rollup invariants for this subtree: every node's size and
    /// key count equal its own key plus the sum over its children, and every
    /// child is keyed by its own segment.
    pub fn is_consistent(&self) -> bool {
        let mut size = self.own.unwrap_or(0);
        let mut keys = u64::from(self.own.is_some());
        for (segment, child) in &self.children {
            if segment != &child.segment || !child.is_consistent() {
                return false;
            }
            size += child.size;
            keys += child.key_count;
        }
        size == self.size && keys == self.key_count
    }

    fn node_count(&self) -> usize {
        1 + self.children.values().map(Node::node_count).sum::<usize>()
    }

    fn absorb_single_children(&mut self) {
        while self.children.len() == 1 && self.own.is_none() {
            let Some((_, child)) = self.children.drain().next() else {
                break;
            };
            self.segment.push_str(&child.segment);
            self.own = child.own;
            self.children = child.children;
        }
        self.children = mem::take(&mut self.children)
            .into_values()
            .map(|mut child| {
                child.absorb_single_children();
                (child.segment.clone(), child)
            })
            .collect();
    }
}

/// A node located by prefix resolution, with its full key path
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'t, 'p> {
    pub node: &'t Node,
    path_len: usize,
    path_tail: &'t str,
    consumed: &'p str,
}

impl Resolved<'_, '_> {
    /// Full key path of the resolved node
    pub fn path(&self) -> String {
        let mut path = String::with_capacity(self.path_len);
        path.push_str(self.consumed);
        path.push_str(self.path_tail);
        path
    }
}

/// Namespace tree for one value type
#[derive(Debug, Clone)]
pub struct NamespaceTree {
    root: Node,
    separators: Separators,
    compressed: bool,
}

impl NamespaceTree {
    /// Create an empty tree whose root is labelled `name`
    pub fn new(name: &str, separators: Separators) -> Self {
        Self {
            root: Node::with_segment(name),
            separators,
            compressed: false,
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn separators(&self) -> &Separators {
        &self.separators
    }

    /// Total number of keys
    pub fn key_count(&self) -> u64 {
        self.root.key_count
    }

    /// Total estimated size of all keys
    pub fn total_size(&self) -> i64 {
        self.root.size
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Record `key` with `size`.
    ///
    /// Adding a key that is already present overwrites it: every node on the
    /// path moves by `size - previous` and key counts stay unchanged.
    /// Insertion is only valid before [`merge_single_child_nodes`].
    ///
    /// [`merge_single_child_nodes`]: NamespaceTree::merge_single_child_nodes
    pub fn add_key(&mut self, key: &str, size: i64) {
        debug_assert!(!self.compressed, "add_key after compression");

        let (steps, tail) = self.separators.split(key);
        let (size_delta, count_delta) = match self.existing_size(&steps, tail) {
            Some(previous) => (size - previous, 0),
            None => (size, 1),
        };

        let mut node = &mut self.root;
        node.size += size_delta;
        node.key_count += count_delta;

        for step in steps {
            node = node
                .children
                .entry(step.to_string())
                .or_insert_with(|| Node::with_segment(step));
            node.size += size_delta;
            node.key_count += count_delta;
        }

        if !tail.is_empty() {
            node = node
                .children
                .entry(tail.to_string())
                .or_insert_with(|| Node::with_segment(tail));
            node.size += size_delta;
            node.key_count += count_delta;
        }
        node.own = Some(size);
    }

    fn existing_size(&self, steps: &[&str], tail: &str) -> Option<i64> {
        let mut node = &self.root;
        for step in steps {
            node = node.children.get(*step)?;
        }
        if !tail.is_empty() {
            node = node.children.get(tail)?;
        }
        node.own
    }

    /// Locate the node for `prefix`.
    ///
    /// Separator-terminated child segments are matched greedily, longest
    /// first, so both the raw separator-split tree and the compressed tree
    /// resolve the same prefixes. A prefix that stops on a separator inside
    /// a compressed segment resolves to that compressed node. The empty
    /// prefix resolves to the root.
    ///
    /// The resolved node borrows the tree only; the prefix may be dropped
    /// once [`Resolved::path`] is no longer needed.
    pub fn resolve<'t, 'p>(&'t self, prefix: &'p str) -> Option<Resolved<'t, 'p>> {
        let mut node = &self.root;
        let mut rest = prefix;

        while !rest.is_empty() {
            let consumed = &prefix[..prefix.len() - rest.len()];

            if let Some(child) = node.children.get(rest) {
                return Some(Resolved {
                    node: child,
                    path_len: prefix.len(),
                    path_tail: &child.segment,
                    consumed,
                });
            }

            let step = self
                .separators
                .first_step(rest)
                .and_then(|s| node.children.get(s))
                .filter(|c| c.segment.len() < rest.len())
                .or_else(|| {
                    node.children
                        .values()
                        .filter(|c| {
                            c.segment.len() < rest.len()
                                && rest.starts_with(&c.segment)
                                && self.separators.ends_with_separator(&c.segment)
                        })
                        .max_by_key(|c| c.segment.len())
                });

            if let Some(child) = step {
                rest = &rest[child.segment.len()..];
                node = child;
                continue;
            }

            if self.separators.ends_with_separator(rest) {
                return node
                    .children
                    .values()
                    .find(|c| c.segment.starts_with(rest))
                    .map(|child| Resolved {
                        node: child,
                        path_len: consumed.len() + child.segment.len(),
                        path_tail: &child.segment,
                        consumed,
                    });
            }
            return None;
        }

        Some(Resolved {
            node,
            path_len: prefix.len(),
            path_tail: "",
            consumed: prefix,
        })
    }

    /// Aggregate size under `prefix`, or 0 when it does not resolve
    pub fn size_of(&self, prefix: &str) -> i64 {
        self.resolve(prefix).map(|r| r.node.size).unwrap_or(0)
    }

    /// The next layer of the namespace under `prefix`
    pub fn expand<'t>(&'t self, prefix: &str) -> Option<&'t HashMap<String, Node>> {
        self.resolve(prefix).map(|r| r.node.children())
    }

    /// Collapse chains of single-child nodes below the root.
    ///
    /// A node absorbs its lone child (segments concatenated, the child's
    /// children and key mark adopted) until it has zero or several children.
    /// Nodes that are themselves keys keep their child so the key stays
    /// addressable. Sizes and key counts are untouched.
    pub fn merge_single_child_nodes(&mut self) {
        self.root.children = mem::take(&mut self.root.children)
            .into_values()
            .map(|mut child| {
                child.absorb_single_children();
                (child.segment.clone(), child)
            })
            .collect();
        self.compressed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(sep: &[u8]) -> NamespaceTree {
        NamespaceTree::new("test", Separators::new(sep))
    }

    fn scenario(sep: char) -> NamespaceTree {
        let s = sep.to_string();
        let mut t = tree(&[sep as u8]);
        t.add_key(&format!("foo{s}bar"), 1);
        t.add_key(&format!("foo{s}bar{s}baz"), 2);
        t.add_key(&format!("foo{s}qux"), 3);
        t
    }

    #[test]
    fn test_split_steps() {
        let seps = Separators::new(b":.");
        assert_eq!(seps.split("a:b.c"), (vec!["a:", "b."], "c"));
        assert_eq!(seps.split("plain"), (vec![], "plain"));
        assert_eq!(seps.split("trail:"), (vec!["trail:"], ""));
        assert_eq!(seps.split(""), (vec![], ""));
    }

    #[test]
    fn test_reference_scenario() {
        for sep in [':', '/'] {
            let t = scenario(sep);
            let s = sep.to_string();
            assert_eq!(t.size_of(&format!("foo{s}")), 6);
            assert_eq!(t.size_of(&format!("foo{s}bar{s}")), 2);

            let expanded = t.expand(&format!("foo{s}")).unwrap();
            let sizes: HashMap<&str, i64> = expanded
                .iter()
                .map(|(k, n)| (k.as_str(), n.size()))
                .collect();
            let bar_dir = format!("bar{s}");
            assert_eq!(sizes.len(), 3);
            assert_eq!(sizes["bar"], 1);
            assert_eq!(sizes[bar_dir.as_str()], 2);
            assert_eq!(sizes["qux"], 3);
            assert!(t.root().is_consistent());

            let mut t = t;
            t.merge_single_child_nodes();
            assert_eq!(t.size_of(&format!("foo{s}")), 6);
            assert_eq!(t.size_of(&format!("foo{s}bar{s}")), 2);
            assert_eq!(t.size_of(&format!("foo{s}bar")), 1);
            assert_eq!(t.expand(&format!("foo{s}")).unwrap().len(), 3);
        }
    }

    #[test]
    fn test_key_counts() {
        let t = scenario(':');
        assert_eq!(t.key_count(), 3);
        assert_eq!(t.total_size(), 6);
        let foo = t.resolve("foo:").unwrap().node;
        assert_eq!(foo.key_count(), 3);
        assert!(!foo.is_terminal());
        assert_eq!(t.resolve("foo:bar").unwrap().node.own_size(), Some(1));
    }

    #[test]
    fn test_overwrite_applies_delta_everywhere() {
        let mut t = scenario(':');
        t.add_key("foo:bar:baz", 10);

        assert_eq!(t.total_size(), 14);
        assert_eq!(t.key_count(), 3);
        assert_eq!(t.size_of("foo:"), 14);
        assert_eq!(t.size_of("foo:bar:"), 10);
        assert_eq!(t.size_of("foo:bar:baz"), 10);
        assert!(t.root().is_consistent());

        t.add_key("foo:bar:baz", 1);
        assert_eq!(t.total_size(), 5);
        assert_eq!(t.size_of("foo:bar:"), 1);
    }

    #[test]
    fn test_key_ending_in_separator_is_terminal_and_prefix() {
        let mut t = tree(b":");
        t.add_key("a:", 4);
        t.add_key("a:b", 6);

        let a = t.resolve("a:").unwrap().node;
        assert_eq!(a.own_size(), Some(4));
        assert_eq!(a.size(), 10);
        assert_eq!(a.key_count(), 2);
        assert!(t.root().is_consistent());

        t.merge_single_child_nodes();
        let a = t.resolve("a:").unwrap().node;
        assert_eq!(a.segment(), "a:");
        assert_eq!(a.child_count(), 1);
        assert!(t.root().is_consistent());
    }

    #[test]
    fn test_empty_key_marks_root() {
        let mut t = tree(b":");
        t.add_key("", 9);
        t.add_key("x", 1);
        assert_eq!(t.root().own_size(), Some(9));
        assert_eq!(t.total_size(), 10);
        assert_eq!(t.size_of(""), 10);
    }

    #[test]
    fn test_expanded_layer_outlives_prefix() {
        let t = scenario(':');
        let children = {
            let prefix = String::from("foo:");
            t.expand(&prefix).unwrap()
        };
        assert_eq!(children.len(), 3);

        let node = {
            let prefix = String::from("foo:bar:");
            t.resolve(&prefix).unwrap().node
        };
        assert_eq!(node.size(), 2);
    }

    #[test]
    fn test_unresolved_prefix() {
        let t = scenario(':');
        assert_eq!(t.size_of("nope:"), 0);
        assert_eq!(t.size_of("foo:ba"), 0);
        assert!(t.expand("foo:zzz:").is_none());
        assert_eq!(t.expand("").unwrap().len(), 1);
    }

    #[test]
    fn test_compression_merges_chains() {
        let mut t = tree(b":");
        t.add_key("app:cache:user:1", 5);
        t.add_key("app:cache:user:2", 7);
        t.add_key("other", 1);
        t.merge_single_child_nodes();

        assert!(t.is_compressed());
        let top = t.expand("").unwrap();
        assert!(top.contains_key("app:cache:user:"));
        assert!(top.contains_key("other"));

        let user = &top["app:cache:user:"];
        assert_eq!(user.size(), 12);
        assert_eq!(user.key_count(), 2);
        assert_eq!(user.child_count(), 2);
        assert!(t.root().is_consistent());
    }

    #[test]
    fn test_lookup_survives_compression() {
        let mut t = tree(b":");
        t.add_key("app:cache:user:1", 5);
        t.add_key("app:cache:user:2", 7);
        t.add_key("app:queue", 3);

        let prefixes = ["", "app:", "app:cache:", "app:cache:user:", "app:cache:user:2", "app:queue"];
        let before: Vec<i64> = prefixes.iter().map(|p| t.size_of(p)).collect();
        t.merge_single_child_nodes();
        let after: Vec<i64> = prefixes.iter().map(|p| t.size_of(p)).collect();
        assert_eq!(before, after);

        let resolved = t.resolve("app:cache:").unwrap();
        assert_eq!(resolved.path(), "app:cache:user:");
        let children = t.expand("app:cache:").unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.contains_key("1"));
    }

    #[test]
    fn test_single_terminal_child_is_absorbed() {
        let mut t = tree(b":");
        t.add_key("solo:key", 8);
        t.add_key("pair:a", 1);
        t.add_key("pair:b", 1);
        t.merge_single_child_nodes();

        let top = t.expand("").unwrap();
        let solo = &top["solo:key"];
        assert_eq!(solo.own_size(), Some(8));
        assert_eq!(solo.child_count(), 0);
        assert_eq!(t.size_of("solo:"), 8);
        assert_eq!(t.size_of("solo:key"), 8);
    }

    #[test]
    fn test_multiple_separators() {
        let mut t = tree(b":.");
        t.add_key("svc.v1:a", 2);
        t.add_key("svc.v2:b", 3);
        assert_eq!(t.size_of("svc."), 5);
        assert_eq!(t.size_of("svc.v1:"), 2);
        assert_eq!(t.expand("svc.").unwrap().len(), 2);
    }
}
