pub mod coordinator;
pub mod justified;
pub mod layout_cache;
pub mod pagination;
pub mod virtualizer;

pub use coordinator::{FrameScheduler, ManualFrameScheduler, RemeasureCoordinator, ResizeEffect};
pub use justified::{pack, JustifiedLayout, RowBreak};
pub use layout_cache::{CachedLayoutComputer, LayoutCache};
pub use pagination::{PaginationState, PaginationTrigger};
pub use virtualizer::{VirtualRow, VirtualWindow, Virtualizer};
