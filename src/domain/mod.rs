// Domain layer: draft model, line items and ports. No I/O here.

pub mod memo;
pub mod model;
pub mod ports;
