use std::cell::Cell;

/// Prefix carried by every block id, making `is_block_id` a syntactic test.
pub const BLOCK_ID_PREFIX: &str = "blk-";

/// True if the string was minted as a block id.
pub fn is_block_id(id: &str) -> bool {
    id.starts_with(BLOCK_ID_PREFIX)
}

/// Mints document-unique block ids.
///
/// Ids are sequential within one generator. Embedders collaborating across
/// processes pass a session prefix so ids never collide between peers.
#[derive(Debug)]
pub struct IdGenerator {
    session: String,
    counter: Cell<u64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        IdGenerator {
            session: String::new(),
            counter: Cell::new(0),
        }
    }

    pub fn with_session(session: &str) -> Self {
        IdGenerator {
            session: session.to_string(),
            counter: Cell::new(0),
        }
    }

    pub fn next_block_id(&self) -> String {
        let n = self.counter.get() + 1;
        self.counter.set(n);
        if self.session.is_empty() {
            format!("{BLOCK_ID_PREFIX}{n:06x}")
        } else {
            format!("{BLOCK_ID_PREFIX}{}-{n:06x}", self.session)
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        IdGenerator::new()
    }
}
