mod trace;

pub use self::trace::TracedBlobStore;
