use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::io::{Read, Write};

use log::{debug, trace};

use crate::bit_stream::{BitReader, BitWriter};
use crate::error::{GrinError, Result};

/// A byte value (0-255) or the end-of-stream sentinel. Needs 9 bits.
pub type Symbol = u16;

pub const EOF: Symbol = 256;
pub const SYMBOL_BITS: u32 = 9;

/// Deepest leaf a tree over 257 symbols can have.
pub const MAX_DEPTH: usize = 256;

pub type FreqTable = HashMap<u8, u64>;
pub type CodeTable = HashMap<Symbol, Vec<bool>>;

#[derive(Debug, Eq, PartialEq)]
pub enum Node {
    Leaf {
        symbol: Symbol,
        freq: u64,
    },
    Internal {
        freq: u64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    /// Construction weight; zero for trees rebuilt from a header.
    pub fn weight(&self) -> u64 {
        match self {
            Node::Leaf { freq, .. } => *freq,
            Node::Internal { freq, .. } => *freq,
        }
    }
}

struct HeapNode {
    freq: u64,
    seq: u64,
    node: Box<Node>,
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapNode {}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap. Equal weights pop in insertion order.
        other
            .freq
            .cmp(&self.freq)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shannon entropy of a byte distribution, in bits per symbol.
pub fn entropy_from_freq(freq: &FreqTable) -> f64 {
    let total: u64 = freq.values().sum();
    if total == 0 {
        return 0.0;
    }
    let total_f = total as f64;

    let entropy: f64 = freq
        .values()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total_f;
            -p * p.log2()
        })
        .sum();

    debug!(
        "Calculated entropy: {:.4} bits/symbol (Total samples: {})",
        entropy, total
    );
    entropy
}

#[derive(Debug)]
pub struct HuffmanTree {
    root: Node,
}

impl HuffmanTree {
    /// Builds the tree bottom-up from byte counts, adding the EOF leaf with weight 1.
    pub fn from_frequencies(frequencies: &FreqTable) -> Self {
        debug!(
            "Building Huffman Tree from {} unique symbols",
            frequencies.len()
        );

        let mut symbols: Vec<(u8, u64)> = frequencies
            .iter()
            .filter(|&(_, &freq)| freq > 0)
            .map(|(&byte, &freq)| (byte, freq))
            .collect();
        symbols.sort_unstable_by_key(|&(byte, _)| byte);

        let leaves = symbols
            .into_iter()
            .map(|(byte, freq)| (Symbol::from(byte), freq))
            .chain(std::iter::once((EOF, 1)));

        let mut heap = BinaryHeap::new();
        let mut seq = 0u64;
        for (symbol, freq) in leaves {
            heap.push(HeapNode {
                freq,
                seq,
                node: Box::new(Node::Leaf { symbol, freq }),
            });
            seq += 1;
        }
        debug!("Initial heap size: {}", heap.len());

        while heap.len() > 1 {
            let (Some(left), Some(right)) = (heap.pop(), heap.pop()) else {
                break;
            };
            let freq = left.freq + right.freq;
            heap.push(HeapNode {
                freq,
                seq,
                node: Box::new(Node::Internal {
                    freq,
                    left: left.node,
                    right: right.node,
                }),
            });
            seq += 1;
        }

        debug!("Tree construction complete.");
        let root = match heap.pop() {
            Some(last) => *last.node,
            None => Node::Leaf { symbol: EOF, freq: 1 },
        };
        HuffmanTree { root }
    }

    /// Rebuilds a tree from its pre-order serialization (see [`HuffmanTree::serialize`]).
    pub fn from_bits<R: Read>(input: &mut BitReader<R>) -> Result<Self> {
        let root = read_node(input, 0)?;
        let tree = HuffmanTree { root };
        debug!(
            "Reconstructed tree: {} leaves, {} branches",
            tree.leaf_count(),
            tree.branch_count()
        );
        Ok(tree)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn leaf_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Internal { left, right, .. } => count(left) + count(right),
            }
        }
        count(&self.root)
    }

    pub fn branch_count(&self) -> usize {
        // full binary tree
        self.leaf_count() - 1
    }

    /// Writes the tree pre-order: `1` then both children for a branch,
    /// `0` then the 9-bit symbol for a leaf.
    pub fn serialize<W: Write>(&self, output: &mut BitWriter<W>) -> Result<()> {
        let start = output.bits_written();
        write_node(&self.root, output)?;
        debug!(
            "Serialized tree header: {} bits",
            output.bits_written() - start
        );
        Ok(())
    }

    /// Maps every leaf symbol to its root-to-leaf path (left = 0, right = 1).
    /// A single-leaf tree gives that leaf an empty code.
    pub fn code_table(&self) -> CodeTable {
        let mut table = CodeTable::new();
        build_code_table(&self.root, Vec::new(), &mut table);
        debug!("Code table built with {} entries.", table.len());
        table
    }

    /// Emits the code of every byte of `input`, then the EOF code.
    /// Returns the number of input bytes encoded.
    pub fn encode<R: Read, W: Write>(
        &self,
        input: &mut BitReader<R>,
        output: &mut BitWriter<W>,
    ) -> Result<u64> {
        let table = self.code_table();
        let start = output.bits_written();
        let mut count = 0u64;

        while let Some(value) = input.read_bits(8)? {
            let symbol = value as Symbol;
            let code = table.get(&symbol).ok_or(GrinError::MissingCode(symbol))?;
            write_code(code, output)?;
            count += 1;
        }

        let eof_code = table.get(&EOF).ok_or(GrinError::MissingCode(EOF))?;
        write_code(eof_code, output)?;

        debug!(
            "Encoded {} bytes into {} payload bits.",
            count,
            output.bits_written() - start
        );
        Ok(count)
    }

    /// Walks the tree one input bit at a time, emitting each leaf reached until
    /// the EOF leaf. Returns the number of bytes written.
    pub fn decode<R: Read, W: Write>(
        &self,
        input: &mut BitReader<R>,
        output: &mut BitWriter<W>,
    ) -> Result<u64> {
        if let Node::Leaf { symbol, .. } = &self.root {
            if *symbol != EOF {
                return Err(GrinError::MissingEof);
            }
        }

        let mut written = 0u64;
        let mut current = &self.root;
        loop {
            match current {
                Node::Leaf { symbol, .. } => {
                    if *symbol == EOF {
                        break;
                    }
                    output.write_bits(u32::from(*symbol & 0xFF), 8)?;
                    written += 1;
                    current = &self.root;
                }
                Node::Internal { left, right, .. } => {
                    let bit = input.read_bit()?.ok_or(GrinError::TruncatedPayload)?;
                    current = if bit { right.as_ref() } else { left.as_ref() };
                }
            }
        }

        debug!("Decoded {} bytes.", written);
        Ok(written)
    }
}

fn read_node<R: Read>(input: &mut BitReader<R>, depth: usize) -> Result<Node> {
    if depth > MAX_DEPTH {
        return Err(GrinError::TreeTooDeep(MAX_DEPTH));
    }
    match input.read_bit()?.ok_or(GrinError::TruncatedHeader)? {
        false => {
            let value = input
                .read_bits(SYMBOL_BITS)?
                .ok_or(GrinError::TruncatedHeader)? as Symbol;
            if value > EOF {
                return Err(GrinError::InvalidSymbol(value));
            }
            Ok(Node::Leaf {
                symbol: value,
                freq: 0,
            })
        }
        true => {
            let left = read_node(input, depth + 1)?;
            let right = read_node(input, depth + 1)?;
            Ok(Node::Internal {
                freq: 0,
                left: Box::new(left),
                right: Box::new(right),
            })
        }
    }
}

fn write_node<W: Write>(node: &Node, output: &mut BitWriter<W>) -> Result<()> {
    match node {
        Node::Leaf { symbol, .. } => {
            output.write_bit(false)?;
            output.write_bits(u32::from(*symbol), SYMBOL_BITS)?;
        }
        Node::Internal { left, right, .. } => {
            output.write_bit(true)?;
            write_node(left, output)?;
            write_node(right, output)?;
        }
    }
    Ok(())
}

fn write_code<W: Write>(code: &[bool], output: &mut BitWriter<W>) -> Result<()> {
    for &bit in code {
        output.write_bit(bit)?;
    }
    Ok(())
}

fn build_code_table(node: &Node, prefix: Vec<bool>, table: &mut CodeTable) {
    match node {
        Node::Leaf { symbol, .. } => {
            trace!(
                "Assigning code to symbol {:#05x}: '{}'",
                symbol,
                prefix.iter().map(|&b| if b { '1' } else { '0' }).collect::<String>()
            );
            table.insert(*symbol, prefix);
        }
        Node::Internal { left, right, .. } => {
            let mut left_prefix = prefix.clone();
            left_prefix.push(false);
            build_code_table(left, left_prefix, table);

            let mut right_prefix = prefix;
            right_prefix.push(true);
            build_code_table(right, right_prefix, table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn freq_of(data: &[u8]) -> FreqTable {
        let mut freq = FreqTable::new();
        for &b in data {
            *freq.entry(b).or_insert(0) += 1;
        }
        freq
    }

    fn serialized(tree: &HuffmanTree) -> (Vec<u8>, u64) {
        let mut writer = BitWriter::new(Vec::new());
        tree.serialize(&mut writer).unwrap();
        let bits = writer.bits_written();
        (writer.finish().unwrap(), bits)
    }

    fn encode_payload(tree: &HuffmanTree, data: &[u8]) -> (Vec<u8>, u64) {
        let mut input = BitReader::new(Cursor::new(data.to_vec()));
        let mut writer = BitWriter::new(Vec::new());
        tree.encode(&mut input, &mut writer).unwrap();
        let bits = writer.bits_written();
        (writer.finish().unwrap(), bits)
    }

    fn decode_payload(tree: &HuffmanTree, payload: Vec<u8>) -> Result<Vec<u8>> {
        let mut input = BitReader::new(Cursor::new(payload));
        let mut writer = BitWriter::new(Vec::new());
        tree.decode(&mut input, &mut writer)?;
        Ok(writer.finish()?)
    }

    #[test]
    fn empty_table_builds_lone_eof_leaf() {
        let tree = HuffmanTree::from_frequencies(&FreqTable::new());
        assert_eq!(tree.root(), &Node::Leaf { symbol: EOF, freq: 1 });
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.branch_count(), 0);

        let table = tree.code_table();
        assert_eq!(table.len(), 1);
        assert!(table[&EOF].is_empty());

        let (payload, bits) = encode_payload(&tree, &[]);
        assert_eq!(bits, 0);
        assert!(decode_payload(&tree, payload).unwrap().is_empty());
    }

    #[test]
    fn single_symbol_costs_one_bit_per_byte() {
        let data = vec![0x41u8; 1000];
        let tree = HuffmanTree::from_frequencies(&freq_of(&data));
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.root().weight(), 1001);

        let (payload, bits) = encode_payload(&tree, &data);
        assert_eq!(bits, 1001);
        assert_eq!(decode_payload(&tree, payload).unwrap(), data);
    }

    #[test]
    fn equal_weights_merge_in_insertion_order() {
        let mut freq = FreqTable::new();
        freq.insert(b'b', 1);
        freq.insert(b'a', 1);
        let tree = HuffmanTree::from_frequencies(&freq);

        // 'a' and 'b' pair first, then EOF joins the lighter side.
        let table = tree.code_table();
        assert_eq!(table[&EOF], vec![false]);
        assert_eq!(table[&Symbol::from(b'a')], vec![true, false]);
        assert_eq!(table[&Symbol::from(b'b')], vec![true, true]);
    }

    #[test]
    fn zero_counts_get_no_leaf() {
        let mut freq = freq_of(b"abc");
        freq.insert(b'z', 0);
        let tree = HuffmanTree::from_frequencies(&freq);
        assert_eq!(tree.leaf_count(), 4);
        assert!(!tree.code_table().contains_key(&Symbol::from(b'z')));
    }

    #[test]
    fn serialization_round_trip_keeps_paths() {
        let tree = HuffmanTree::from_frequencies(&freq_of(b"abracadabra, mississippi"));
        let (header, bits) = serialized(&tree);
        assert_eq!(bits, 10 * tree.leaf_count() as u64 - 1);

        let mut reader = BitReader::new(Cursor::new(header));
        let rebuilt = HuffmanTree::from_bits(&mut reader).unwrap();
        assert_eq!(reader.bits_read(), bits);
        assert_eq!(rebuilt.code_table(), tree.code_table());
        assert_eq!(rebuilt.root().weight(), 0);
    }

    #[test]
    fn codes_are_prefix_free() {
        let tree = HuffmanTree::from_frequencies(&freq_of(
            b"the quick brown fox jumps over the lazy dog 0123456789",
        ));
        let codes: Vec<Vec<bool>> = tree.code_table().into_values().collect();
        for (i, a) in codes.iter().enumerate() {
            for (j, b) in codes.iter().enumerate() {
                if i != j {
                    assert!(!b.starts_with(a), "{:?} is a prefix of {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn all_byte_values_give_257_leaves() {
        let mut freq = FreqTable::new();
        for b in 0..=255u8 {
            freq.insert(b, u64::from(b) * 7 % 31 + 1);
        }
        let tree = HuffmanTree::from_frequencies(&freq);
        assert_eq!(tree.leaf_count(), 257);
        assert_eq!(tree.branch_count(), 256);

        let table = tree.code_table();
        assert_eq!(table.len(), 257);
        for (&a, &fa) in &freq {
            for (&b, &fb) in &freq {
                if fa > fb {
                    let la = table[&Symbol::from(a)].len();
                    let lb = table[&Symbol::from(b)].len();
                    assert!(la <= lb, "freq {} got {} bits, freq {} got {}", fa, la, fb, lb);
                }
            }
        }
    }

    #[test]
    fn truncated_header_is_rejected() {
        let tree = HuffmanTree::from_frequencies(&freq_of(b"hello"));
        let (mut header, _) = serialized(&tree);
        header.truncate(2);
        let mut reader = BitReader::new(Cursor::new(header));
        assert!(matches!(
            HuffmanTree::from_bits(&mut reader),
            Err(GrinError::TruncatedHeader)
        ));
    }

    #[test]
    fn endless_branch_bits_are_rejected() {
        let mut reader = BitReader::new(Cursor::new(vec![0xFF; 200_000]));
        let err = HuffmanTree::from_bits(&mut reader).unwrap_err();
        assert!(matches!(err, GrinError::TreeTooDeep(MAX_DEPTH)));
        assert!(err.is_format_error());
        assert_eq!(reader.bits_read(), MAX_DEPTH as u64 + 1);
    }

    #[test]
    fn deepest_possible_tree_is_accepted() {
        // A right-leaning chain: 256 branches, leaves 0..=255 on the left, EOF last.
        let mut writer = BitWriter::new(Vec::new());
        for symbol in 0..MAX_DEPTH as u32 {
            writer.write_bit(true).unwrap();
            writer.write_bit(false).unwrap();
            writer.write_bits(symbol, SYMBOL_BITS).unwrap();
        }
        writer.write_bit(false).unwrap();
        writer.write_bits(u32::from(EOF), SYMBOL_BITS).unwrap();

        let mut reader = BitReader::new(Cursor::new(writer.finish().unwrap()));
        let tree = HuffmanTree::from_bits(&mut reader).unwrap();
        assert_eq!(tree.leaf_count(), 257);
        assert_eq!(tree.code_table()[&EOF].len(), MAX_DEPTH);
    }

    #[test]
    fn out_of_range_symbol_is_rejected() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bit(false).unwrap();
        writer.write_bits(300, SYMBOL_BITS).unwrap();
        let mut reader = BitReader::new(Cursor::new(writer.finish().unwrap()));
        assert!(matches!(
            HuffmanTree::from_bits(&mut reader),
            Err(GrinError::InvalidSymbol(300))
        ));
    }

    #[test]
    fn payload_without_eof_code_is_truncated() {
        let data = b"aaaaabbbc";
        let tree = HuffmanTree::from_frequencies(&freq_of(data));
        let (mut payload, _) = encode_payload(&tree, data);
        payload.pop();
        assert!(matches!(
            decode_payload(&tree, payload),
            Err(GrinError::TruncatedPayload)
        ));
    }

    #[test]
    fn lone_byte_leaf_cannot_decode() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bit(false).unwrap();
        writer.write_bits(u32::from(b'A'), SYMBOL_BITS).unwrap();
        let mut reader = BitReader::new(Cursor::new(writer.finish().unwrap()));
        let tree = HuffmanTree::from_bits(&mut reader).unwrap();
        assert!(matches!(
            decode_payload(&tree, vec![0xFF]),
            Err(GrinError::MissingEof)
        ));
    }

    #[test]
    fn unknown_byte_has_no_code() {
        let tree = HuffmanTree::from_frequencies(&freq_of(b"aaa"));
        let mut input = BitReader::new(Cursor::new(b"ab".to_vec()));
        let mut writer = BitWriter::new(Vec::new());
        let err = tree.encode(&mut input, &mut writer).unwrap_err();
        assert!(matches!(err, GrinError::MissingCode(98)));
        assert!(!err.is_format_error());
    }

    #[test]
    fn entropy_of_uniform_distribution() {
        let entropy = entropy_from_freq(&freq_of(b"abcdabcd"));
        assert!((entropy - 2.0).abs() < 1e-9);
        assert_eq!(entropy_from_freq(&FreqTable::new()), 0.0);
    }
}
