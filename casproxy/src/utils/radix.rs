//! Prefix-compressed tree (radix / patricia) keyed on byte strings.
//!
//! Edges carry whole byte runs instead of single characters, so a large set of keys that share a
//! few long roots (`/apps/<uuid>/...`) costs one node per branching point rather than one per byte.
//! Lookups here are exact-match only.

#[derive(Debug)]
pub struct RadixTree<V> {
    root: Node<V>,
    len: usize,
}

#[derive(Debug)]
struct Node<V> {
    label: Vec<u8>,
    value: Option<V>,
    // Sorted by the first byte of each label; labels of children are never empty.
    children: Vec<Node<V>>,
}

impl<V> Node<V> {
    fn new(label: Vec<u8>, value: Option<V>) -> Self {
        Self { label, value, children: Vec::new() }
    }

    fn child_index(&self, first: u8) -> Result<usize, usize> {
        self.children.binary_search_by_key(&first, |child| child.label[0])
    }

    /// Turn `label[..at]` into an interior node that keeps `label[at..]` (with this node's value and
    /// children) as its only child.
    fn split(&mut self, at: usize) {
        let tail = self.label.split_off(at);
        let demoted = Node { label: tail, value: self.value.take(), children: std::mem::take(&mut self.children) };
        self.children = vec![demoted];
    }

    /// Fold a lone child back into this valueless node.
    fn merge_only_child(&mut self) {
        if let Some(child) = self.children.pop() {
            self.label.extend_from_slice(&child.label);
            self.value = child.value;
            self.children = child.children;
        }
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

impl<V> Default for RadixTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RadixTree<V> {
    pub fn new() -> Self {
        Self { root: Node::new(Vec::new(), None), len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        let mut node = &self.root;
        let mut rest = key.as_bytes();
        loop {
            if rest.is_empty() {
                return node.value.as_ref();
            }
            let idx = node.child_index(rest[0]).ok()?;
            let child = &node.children[idx];
            rest = rest.strip_prefix(child.label.as_slice())?;
            node = child;
        }
    }

    /// Insert `value` under `key` unless the key is already present, in which case the tree is left
    /// untouched and the value is handed back.
    pub fn insert(&mut self, key: &str, value: V) -> Result<(), V> {
        let mut node = &mut self.root;
        let mut rest = key.as_bytes();
        loop {
            if rest.is_empty() {
                if node.value.is_some() {
                    return Err(value);
                }
                node.value = Some(value);
                self.len += 1;
                return Ok(());
            }

            let idx = match node.child_index(rest[0]) {
                Ok(idx) => idx,
                Err(pos) => {
                    node.children.insert(pos, Node::new(rest.to_vec(), Some(value)));
                    self.len += 1;
                    return Ok(());
                }
            };

            // Diverging inside an edge means the key cannot exist yet, so splitting is safe here.
            let common = common_prefix_len(&node.children[idx].label, rest);
            if common < node.children[idx].label.len() {
                node.children[idx].split(common);
            }
            node = &mut node.children[idx];
            rest = &rest[common..];
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let removed = Self::remove_from(&mut self.root, key.as_bytes())?;
        self.len -= 1;
        Some(removed)
    }

    fn remove_from(node: &mut Node<V>, key: &[u8]) -> Option<V> {
        if key.is_empty() {
            return node.value.take();
        }
        let idx = node.child_index(key[0]).ok()?;
        let rest = key.strip_prefix(node.children[idx].label.as_slice())?;
        let removed = Self::remove_from(&mut node.children[idx], rest)?;

        let child = &mut node.children[idx];
        if child.value.is_none() {
            match child.children.len() {
                0 => {
                    node.children.remove(idx);
                }
                1 => child.merge_only_child(),
                _ => {}
            }
        }
        Some(removed)
    }
}
