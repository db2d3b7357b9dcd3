use crate::{
    error::{Error, Result},
    frequency::FrequencyTable,
    util::bit_string,
};
use std::fmt;
use tracing::{debug, trace};

/// Longest code the dictionary format can describe.
pub const MAX_CODE_BITS: u8 = 31;

/// Arena node, children are addressed by index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    Leaf(u8),
    Node { left: usize, right: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct WeightedNode {
    weight: u64,
    index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct WeightedItem<T = u8> {
    pub weight: u64,
    pub item: T,
}

/// Huffman tree for one input. Only lives until its codes are assigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl Tree {
    /// Builds the tree by repeatedly merging the two lightest nodes of a list
    /// kept sorted by weight. Equal weights keep their insertion order, and a
    /// merged node goes after every node of the same weight.
    pub fn new(items: impl Iterator<Item = WeightedItem>) -> Self {
        let items: Vec<WeightedItem> = items.collect();
        let mut nodes = Vec::with_capacity((2 * items.len()).saturating_sub(1));
        let mut sorted: Vec<WeightedNode> = Vec::with_capacity(items.len());

        for item in items {
            nodes.push(Node::Leaf(item.item));
            insert_sorted(
                &mut sorted,
                WeightedNode {
                    weight: item.weight,
                    index: nodes.len() - 1,
                },
            );
        }

        while let &[left, right, ..] = sorted.as_slice() {
            sorted.drain(..2);
            nodes.push(Node::Node {
                left: left.index,
                right: right.index,
            });
            insert_sorted(
                &mut sorted,
                WeightedNode {
                    weight: left.weight.saturating_add(right.weight),
                    index: nodes.len() - 1,
                },
            );
        }

        let root = sorted.first().map(|node| node.index);
        debug!(nodes = nodes.len(), "built huffman tree");
        Tree { nodes, root }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<Node> {
        self.root.map(|index| self.nodes[index])
    }

    /// Walks the tree, left edges append a 0 and right edges a 1.
    pub fn codes(&self) -> Result<CodeTable> {
        let mut table = CodeTable::default();
        let Some(root) = self.root else {
            return Ok(table);
        };
        match self.nodes[root] {
            // a lone leaf still needs one bit on the wire
            Node::Leaf(symbol) => table.insert(symbol, Code::new(1, 0)),
            Node::Node { .. } => self.assign(root, 0, 0, &mut table)?,
        }
        Ok(table)
    }

    fn assign(&self, index: usize, depth: u8, bits: u32, table: &mut CodeTable) -> Result<()> {
        if depth > MAX_CODE_BITS {
            return Err(Error::DepthLimitExceeded { depth });
        }
        match self.nodes[index] {
            Node::Leaf(symbol) => {
                trace!(symbol, depth, bits, "assigned code");
                table.insert(symbol, Code::new(depth, bits));
            }
            Node::Node { left, right } => {
                self.assign(left, depth + 1, bits << 1, table)?;
                self.assign(right, depth + 1, (bits << 1) | 1, table)?;
            }
        }
        Ok(())
    }
}

fn insert_sorted(sorted: &mut Vec<WeightedNode>, node: WeightedNode) {
    let position = sorted.partition_point(|other| other.weight <= node.weight);
    sorted.insert(position, node);
}

/// Right-aligned code of `depth` bits. A depth of zero means no code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Code {
    pub depth: u8,
    pub bits: u32,
}

impl Code {
    pub const fn new(depth: u8, bits: u32) -> Self {
        Code { depth, bits }
    }

    pub fn is_present(&self) -> bool {
        self.depth > 0
    }

    /// True if `self` is a proper or equal prefix of `other`.
    pub fn is_prefix_of(&self, other: &Code) -> bool {
        self.is_present()
            && self.depth <= other.depth
            && other.bits >> (other.depth - self.depth) == self.bits
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bit_string(self.bits, self.depth))
    }
}

/// Code of every byte value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeTable {
    codes: [Code; 256],
}

impl Default for CodeTable {
    fn default() -> Self {
        CodeTable {
            codes: [Code::default(); 256],
        }
    }
}

impl CodeTable {
    /// Builds the tree for `frequencies`, assigns codes, then drops the tree.
    pub fn from_frequencies(frequencies: &FrequencyTable) -> Result<Self> {
        Tree::new(frequencies.iter()).codes()
    }

    pub fn get(&self, symbol: u8) -> Code {
        self.codes[usize::from(symbol)]
    }

    pub fn insert(&mut self, symbol: u8, code: Code) {
        self.codes[usize::from(symbol)] = code;
    }

    /// Present symbols and their codes, in ascending symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, Code)> + '_ {
        (0..=u8::MAX)
            .zip(self.codes.iter().copied())
            .filter(|(_, code)| code.is_present())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Number of payload bits encoding an input with these counts produces.
    pub fn payload_bits(&self, frequencies: &FrequencyTable) -> u64 {
        self.iter()
            .map(|(symbol, code)| frequencies.get(symbol) * u64::from(code.depth))
            .sum()
    }

    pub fn average_code_length(&self, frequencies: &FrequencyTable) -> f64 {
        if frequencies.is_empty() {
            return 0.0;
        }
        self.payload_bits(frequencies) as f64 / frequencies.total() as f64
    }

    pub fn is_prefix_free(&self) -> bool {
        self.iter().all(|(a, left)| {
            self.iter()
                .all(|(b, right)| a == b || !left.is_prefix_of(&right))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use test_strategy::proptest;

    fn table(input: &[u8]) -> CodeTable {
        CodeTable::from_frequencies(&FrequencyTable::from_bytes(input)).unwrap()
    }

    fn kraft(table: &CodeTable) -> f64 {
        table
            .iter()
            .map(|(_, code)| 2f64.powi(-i32::from(code.depth)))
            .sum()
    }

    #[proptest]
    fn test_node(#[filter(!#items.is_empty())] items: BTreeMap<u8, u16>) {
        let tree = Tree::new(items.iter().map(|(item, weight)| WeightedItem {
            item: *item,
            weight: u64::from(*weight),
        }));
        prop_assert_eq!(tree.len(), 2 * items.len() - 1);
        let codes = tree.codes().unwrap();

        for byte in items.keys() {
            prop_assert!(codes.get(*byte).is_present());
        }
        prop_assert_eq!(codes.len(), items.len());
        prop_assert!(codes.is_prefix_free());
        prop_assert!(kraft(&codes) <= 1.0);
    }

    #[proptest]
    fn test_bit_accounting(input: Vec<u8>) {
        let frequencies = FrequencyTable::from_bytes(&input);
        let codes = CodeTable::from_frequencies(&frequencies).unwrap();
        let bits: u64 = input.iter().map(|byte| u64::from(codes.get(*byte).depth)).sum();
        prop_assert_eq!(codes.payload_bits(&frequencies), bits);
    }

    #[test]
    fn test_single_symbol() {
        let codes = table(b"aaaa");
        assert_eq!(codes.get(b'a'), Code::new(1, 0));
        assert_eq!(codes.len(), 1);
    }

    #[test]
    fn test_empty() {
        let tree = Tree::new(std::iter::empty());
        assert!(tree.is_empty());
        assert!(tree.codes().unwrap().is_empty());
    }

    #[test]
    fn test_abacabad() {
        let codes = table(b"abacabad");
        let a = codes.get(b'a');
        assert_eq!(a.depth, 1);
        for byte in b"bcd" {
            assert!(codes.get(*byte).depth > a.depth);
        }
        assert_eq!(codes.get(b'b').depth, 2);
        assert_eq!(codes.get(b'c').depth, 3);
        assert_eq!(codes.get(b'd').depth, 3);
        assert!(kraft(&codes) <= 1.0);
        assert!(codes.is_prefix_free());
    }

    #[test]
    fn test_tie_break() {
        // lightest node goes left, merged nodes go after equal weights
        let tree = Tree::new(
            [(b'x', 1), (b'y', 1), (b'z', 2)]
                .into_iter()
                .map(|(item, weight)| WeightedItem { weight, item }),
        );
        let codes = tree.codes().unwrap();
        assert_eq!(codes.get(b'z'), Code::new(1, 0));
        assert_eq!(codes.get(b'x'), Code::new(2, 0b10));
        assert_eq!(codes.get(b'y'), Code::new(2, 0b11));
    }

    #[test]
    fn test_depth_limit() {
        // fibonacci weights produce a fully skewed tree
        let mut weights = vec![1u64, 1];
        while weights.len() < 34 {
            let next = weights[weights.len() - 1] + weights[weights.len() - 2];
            weights.push(next);
        }
        let tree = Tree::new(weights.iter().enumerate().map(|(item, weight)| WeightedItem {
            weight: *weight,
            item: item as u8,
        }));
        assert!(matches!(
            tree.codes(),
            Err(Error::DepthLimitExceeded { .. })
        ));

        let tree = Tree::new(weights[..32].iter().enumerate().map(|(item, weight)| {
            WeightedItem {
                weight: *weight,
                item: item as u8,
            }
        }));
        let codes = tree.codes().unwrap();
        assert_eq!(codes.iter().map(|(_, code)| code.depth).max(), Some(31));
    }

    #[test]
    fn test_display() {
        assert_eq!(Code::new(3, 0b011).to_string(), "011");
        assert_eq!(Code::new(1, 0).to_string(), "0");
    }
}
