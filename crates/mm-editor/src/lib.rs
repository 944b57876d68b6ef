pub mod canvas;
pub mod debounce;
pub mod engine;
pub mod focus;
pub mod input;
pub mod shortcuts;
pub mod sync;

pub use canvas::{Canvas, CanvasAction};
pub use debounce::Coalescer;
pub use engine::{EditError, Intent, MutationEngine};
pub use focus::{Direction, Focus};
pub use input::InputEvent;
pub use shortcuts::{ShortcutAction, ShortcutMap};
pub use sync::{Envelope, LinkCommand, LinkState, Mutation, RoomLink};
