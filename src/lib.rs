/// Use mimalloc as the global allocator. The binary allocates one input
/// buffer per file and, for large inputs, one output buffer per rayon task.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod despace;
