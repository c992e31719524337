pub const SPAV10: &str = "spAv1.0";
pub const SPBV10: &str = "spBv1.0";

pub const NODE_CONTROL_REBIRTH: &str = "Node Control/Rebirth";
pub const BDSEQ: &str = "bdSeq";
/// Reserved metric carrying the sequence number in revision A payloads
pub const SEQ: &str = "seq";

pub const NBIRTH: &str = "NBIRTH";
pub const NDEATH: &str = "NDEATH";
pub const NDATA: &str = "NDATA";
pub const NCMD: &str = "NCMD";

pub const DBIRTH: &str = "DBIRTH";
pub const DDEATH: &str = "DDEATH";
pub const DDATA: &str = "DDATA";
pub const DCMD: &str = "DCMD";

pub const STATE: &str = "STATE";
