// Domain layer: tables, reports and ports (interfaces). No I/O beyond the Storage port.

pub mod model;
pub mod ports;
