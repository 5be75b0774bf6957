//! Static region layout.

use super::CodegenError;
use crate::ir::DataInitialization;

/// Size of every initialized value.
const QUAD: u64 = 8;

/// A piece of a region, in emission order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    /// A run of zero bytes.
    Zero(u64),

    /// A 64-bit value.
    Quad(i64),
}

/// Lays out the initializers of a single region.
///
/// Values are placed in ascending offset order regardless of input order,
/// with explicit zero padding before each one so that every offset maps
/// to the exact byte position it names. An empty region still reserves
/// one zeroed quadword.
pub fn pack(initializations: &[DataInitialization]) -> Result<Vec<Chunk>, CodegenError> {
    let mut sorted: Vec<_> = initializations.iter().collect();
    sorted.sort_by_key(|init| init.offset);

    let mut chunks = Vec::with_capacity(2 * sorted.len());
    let mut cursor = 0;

    for init in sorted {
        if init.offset < cursor {
            return Err(CodegenError::Overlap(init.section, init.offset));
        }

        if init.offset > cursor {
            chunks.push(Chunk::Zero(init.offset - cursor));
        }

        chunks.push(Chunk::Quad(init.value));
        cursor = init.offset.saturating_add(QUAD);
    }

    if chunks.is_empty() {
        chunks.push(Chunk::Zero(QUAD));
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Section;

    fn data(offset: u64, value: i64) -> DataInitialization {
        DataInitialization {
            section: Section::Data,
            offset,
            value,
        }
    }

    #[test]
    fn pads_gaps_regardless_of_order() {
        let chunks = pack(&[data(16, 20), data(0, 10)]).unwrap();
        assert_eq!(chunks, vec![Chunk::Quad(10), Chunk::Zero(8), Chunk::Quad(20)]);
    }

    #[test]
    fn pads_before_the_first_value() {
        let chunks = pack(&[data(24, -1)]).unwrap();
        assert_eq!(chunks, vec![Chunk::Zero(24), Chunk::Quad(-1)]);
    }

    #[test]
    fn reserves_space_for_empty_regions() {
        assert_eq!(pack(&[]).unwrap(), vec![Chunk::Zero(8)]);
    }

    #[test]
    fn rejects_overlaps() {
        let error = pack(&[data(0, 1), data(4, 2)]).unwrap_err();
        assert!(matches!(error, CodegenError::Overlap(Section::Data, 4)));
    }
}
