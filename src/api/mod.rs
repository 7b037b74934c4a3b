//! Client-side views of the DICOMweb transactions: what is sent to a source and what
//! comes back, independent of the transport.

pub mod qido;
pub mod wado;
