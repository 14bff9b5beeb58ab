//! The seam between a replica and whatever moves its patches around.

/// One replica's connection to a transport.
///
/// `send` hands over a serialized batch; the transport owns delivery,
/// retries and ordering between batches. Bytes within one batch are never
/// reordered.
pub trait Session {
    fn send(&self, batch: &[u8]);

    /// Install the handler invoked for every batch arriving from another
    /// replica. Installing a new handler replaces the previous one.
    fn on_receive(&self, handler: Box<dyn FnMut(&[u8])>);
}

pub trait Transport {
    type Session: Session + 'static;

    fn connect(&self, replica_id: u64) -> Self::Session;
}
