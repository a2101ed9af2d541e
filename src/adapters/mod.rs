//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter      | Implements   | Connects to                     |
//! |--------------|--------------|---------------------------------|
//! | `fs`         | FileStore    | SD card through `std::fs`       |
//! | `mem_fs`     | FileStore    | In-memory map (simulation)      |
//! | `machine`    | MachinePort  | Flag-only stand-in motion core  |
//! | `line_queue` | ConsoleSink  | Queue drained by the shell      |
//! | `time`       | TimePort     | ESP32 system timer              |

pub mod fs;
pub mod line_queue;
pub mod machine;
pub mod mem_fs;
pub mod time;
