pub mod ai;
pub mod cover;
pub mod death;
pub mod morale;
pub mod movement;
pub mod perception;
pub mod rotation;
pub mod squad;

pub use ai::*;
pub use cover::*;
pub use death::*;
pub use morale::*;
pub use movement::*;
pub use perception::*;
pub use rotation::*;
pub use squad::*;
