//! Multi-Order Coverage map emission (§4.M step 8): the set of tiles that
//! carry data, expressed as NUNIQ pixel numbers and serialized as the
//! single-column FITS BINTABLE the IVOA MOC standard defines.

use std::string::ToString;
use std::vec::Vec;

use crate::error::{FitsResult as Result};
use crate::fits::bintable::{serialize_binary_table_hdu, BinaryColumnData, BinaryColumnDescriptor, BinaryColumnType};

/// `uniq = 4 * 4^order + ipix`, the packed pixel number MOC uses so that a
/// single sorted integer list can mix tiles from different orders.
pub fn to_uniq(order: u8, ipix: u64) -> u64 {
    4 * (4u64.pow(order as u32)) + ipix
}

/// Inverse of [`to_uniq`].
pub fn from_uniq(uniq: u64) -> (u8, u64) {
    let mut order = 0u8;
    let mut four_pow = 4u64;
    while four_pow * 4 <= uniq {
        four_pow *= 4;
        order += 1;
    }
    (order, uniq - 4 * four_pow)
}

/// A coverage map: the sorted, deduplicated set of NUNIQ pixel numbers for
/// every tile in the dataset that has data, taken at the dataset's deepest
/// (max) order per §4.M step 8.
#[derive(Debug, Clone, Default)]
pub struct Moc {
    pub uniq: Vec<u64>,
}

impl Moc {
    /// Build a MOC from the max-order tiles (`order`, `ipix`) that carry
    /// data; non-present tiles contribute nothing.
    pub fn from_max_order_tiles(order: u8, present_ipix: impl IntoIterator<Item = u64>) -> Self {
        let mut uniq: Vec<u64> = present_ipix.into_iter().map(|ipix| to_uniq(order, ipix)).collect();
        uniq.sort_unstable();
        uniq.dedup();
        Moc { uniq }
    }

    /// Serialize as a single-HDU FITS file: a BINTABLE with one `J`/`K`
    /// (32/64-bit integer) `UNIQ` column, matching the IVOA MOC FITS
    /// serialization for an order up to 29.
    pub fn to_fits(&self) -> Result<Vec<u8>> {
        let columns = std::vec![BinaryColumnDescriptor {
            name: Some("UNIQ".to_string()),
            repeat: 1,
            col_type: BinaryColumnType::Long,
            byte_width: 8,
        }];
        let col_data = std::vec![BinaryColumnData::Long(self.uniq.iter().map(|&u| u as i64).collect())];
        serialize_binary_table_hdu(&columns, &col_data, self.uniq.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniq_round_trips() {
        for order in 0..6 {
            for ipix in 0..20 {
                let uniq = to_uniq(order, ipix);
                assert_eq!(from_uniq(uniq), (order, ipix));
            }
        }
    }

    #[test]
    fn from_max_order_tiles_sorts_and_dedups() {
        let moc = Moc::from_max_order_tiles(3, std::vec![5, 2, 5, 9]);
        assert_eq!(moc.uniq, std::vec![to_uniq(3, 2), to_uniq(3, 5), to_uniq(3, 9)]);
    }
}
