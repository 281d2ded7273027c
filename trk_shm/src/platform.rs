//! Platform layer: backing files, memory mapping, futex rendezvous, process
//! liveness and the monotonic clock.

pub mod linux;

pub use linux::{
    create_segment_file, futex_wait, futex_wake_all, futex_wake_one, get_current_pid,
    is_process_alive, map_segment, monotonic_ns, open_segment_file,
};
