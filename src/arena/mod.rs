mod dynamic;
mod static_arena;

pub use dynamic::DynamicArena;
pub use static_arena::StaticArena;
