//! Mirrors the teacher's `space_usage.rs`: a small trait so the engine's major
//! structures can report their own memory footprint for diagnostics.

pub trait SpaceUsage {
    /// Reports the space usage in bytes of the data structure.
    fn space_usage_byte(&self) -> usize;

    /// Reports the space usage in mega bytes of the data structure.
    fn space_usage_mb(&self) -> f64 {
        self.space_usage_byte() as f64 / 1_048_576.0
    }
}

impl<T> SpaceUsage for Vec<T> {
    fn space_usage_byte(&self) -> usize {
        self.capacity() * std::mem::size_of::<T>()
    }
}

impl<T> SpaceUsage for [T] {
    fn space_usage_byte(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

impl<T> SpaceUsage for Box<[T]> {
    fn space_usage_byte(&self) -> usize {
        std::mem::size_of_val(self.as_ref())
    }
}
