/// Handle of a connection registered with a
/// [`NetInterface`](crate::NetInterface). Keys are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey(u64);

impl ConnectionKey {
    pub fn to_u64(&self) -> u64 {
        self.0
    }
}

pub(crate) struct KeyGenerator {
    next: u64,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn generate(&mut self) -> ConnectionKey {
        let key = ConnectionKey(self.next);
        self.next = self.next.wrapping_add(1);
        key
    }
}
