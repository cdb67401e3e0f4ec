//! Domain events

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartEvent {
    ItemAdded { variant_id: u64, quantity: u32, line_quantity: u32 },
    ItemReduced { variant_id: u64, remaining: u32 },
    ItemRemoved { variant_id: u64 },
    Cleared,
}
