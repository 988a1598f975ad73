//! ## tessera-core::generator
//! Monotonic id source guarded by its own lock. Every value handed out is
//! strictly greater than all earlier values of the same generator; running
//! off the end of the integer range is an error, never a wrap-around.

use parking_lot::Mutex;

use crate::GeneratorError;

/// Integer types a generator can count in.
pub trait Counter: Copy + PartialOrd + Send + 'static {
    const ZERO: Self;

    fn checked_step(self, step: Self) -> Option<Self>;
}

macro_rules! impl_counter {
    ($($ty:ty),*) => {
        $(
            impl Counter for $ty {
                const ZERO: Self = 0;

                #[inline]
                fn checked_step(self, step: Self) -> Option<Self> {
                    self.checked_add(step)
                }
            }
        )*
    };
}

impl_counter!(i16, i32, i64, u16, u32, u64, usize);

struct State<T> {
    last: Option<T>,
    first: T,
    step: T,
}

pub struct IncreaseGenerator<T: Counter> {
    state: Mutex<State<T>>,
}

impl<T: Counter> IncreaseGenerator<T> {
    /// Generator yielding `first`, `first + step`, `first + 2 * step`, ...
    pub fn new(first: T, step: T) -> Result<Self, GeneratorError> {
        if step <= T::ZERO {
            return Err(GeneratorError::InvalidStep);
        }
        Ok(Self {
            state: Mutex::new(State {
                last: None,
                first,
                step,
            }),
        })
    }

    pub fn next(&self) -> Result<T, GeneratorError> {
        let mut state = self.state.lock();
        let value = match state.last {
            None => state.first,
            Some(last) => last
                .checked_step(state.step)
                .ok_or(GeneratorError::Exhausted)?,
        };
        state.last = Some(value);
        Ok(value)
    }
}

impl<T: Counter> std::fmt::Debug for IncreaseGenerator<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("IncreaseGenerator")
            .field("last", &state.last)
            .field("step", &state.step)
            .finish()
    }
}
