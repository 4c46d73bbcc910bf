//! Typed configuration surface for §6.4's `CONFIG_INT`/`CONFIG_STR` keys.
//!
//! Constructed directly as a plain struct literal, since the core crate is a library consumed by
//! an embedder. The CLI demo binary (`src/bin/lpcvm.rs`) layers a TOML file with `serde` on top
//! of this.

use serde::{Deserialize, Serialize};

/// Resource and behavior limits the interpreter enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Height of the evaluator stack (`__EVALUATOR_STACK_SIZE__`).
    pub evaluator_stack_size: usize,
    /// Depth of the control stack (`__MAX_CALL_DEPTH__`).
    pub max_call_depth: usize,
    /// Per-tick instruction budget (`__MAX_EVAL_COST__`).
    pub max_eval_cost: i64,
    /// Upper bound for string concatenation results (`__MAX_STRING_LENGTH__`).
    pub max_string_length: usize,
    /// Upper bound for file/buffer I/O per call (`__MAX_BYTE_TRANSFER__`).
    pub max_byte_transfer: usize,
    /// Upper bound for array allocation (`__MAX_ARRAY_SIZE__`).
    pub max_array_size: usize,
    /// Upper bound for mapping node count (`__MAX_MAPPING_SIZE__`).
    pub max_mapping_size: usize,
    /// Upper bound for `set_bit` positions (`__MAX_BITFIELD_BITS__`).
    pub max_bitfield_bits: usize,
    /// Upper bound for `read_file` (`__MAX_READ_FILE_SIZE__`).
    pub max_read_file_size: usize,
    /// Interval seed for object reset scheduling, in seconds (`__TIME_TO_RESET__`).
    pub time_to_reset: u32,
    /// Living-name hash table capacity (`__LIVING_HASH_TABLE_SIZE__`).
    pub living_hash_table_size: usize,
    /// Reserve-pool size for OOM recovery, in bytes (`__RESERVED_MEM_SIZE__`).
    pub reserved_mem_size: usize,
    /// Maximum recursion depth accepted by the save/restore codec.
    pub max_save_svalue_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            evaluator_stack_size: 8192,
            max_call_depth: 256,
            max_eval_cost: 10_000_000,
            max_string_length: 200_000,
            max_byte_transfer: 200_000,
            max_array_size: 100_000,
            max_mapping_size: 100_000,
            max_bitfield_bits: 1 << 20,
            max_read_file_size: 200_000,
            time_to_reset: 1800,
            living_hash_table_size: 1024,
            reserved_mem_size: 1 << 20,
            max_save_svalue_depth: 60,
        }
    }
}
