//! Fixed ordering bands for assembled chains.
//!
//! Numerically lower values run earlier. User-supplied priorities order
//! contributions within their band; the bands themselves are fixed by the
//! assembler. Gaps between the constants leave room for container units
//! that need to slot between bands.

/// Bands for the post-construct pipeline.
pub mod construction {
    /// The ambient-context unit, always first.
    pub const CONTEXT_PROPAGATION: i32 = 0x100;

    /// Primary instance and interceptor-instance creation.
    pub const INSTANTIATION: i32 = 0x200;

    /// Resource injection, innermost-first.
    pub const RESOURCE_INJECTION: i32 = 0x300;

    /// User post-construct contributions.
    pub const USER: i32 = 0x400;

    /// The stop-and-return-success terminal, always last.
    pub const TERMINAL: i32 = 0x700;
}

/// Bands for the pre-destroy pipeline.
pub mod destruction {
    /// The ambient-context unit, always first.
    pub const CONTEXT_PROPAGATION: i32 = 0x100;

    /// User pre-destroy contributions, while the instance and its
    /// resources are still live.
    pub const USER: i32 = 0x200;

    /// Resource release, in reverse order of injection.
    pub const UNINJECTION: i32 = 0x300;

    /// Primary instance release, after uninjection.
    pub const INSTANCE_RELEASE: i32 = 0x400;

    /// The stop-and-return-success terminal, always last.
    pub const TERMINAL: i32 = 0x700;
}

/// Bands for the pre-passivate and post-activate pipelines.
pub mod passivation {
    /// The ambient-context unit, always first.
    pub const CONTEXT_PROPAGATION: i32 = 0x100;

    /// User passivation contributions.
    pub const USER: i32 = 0x400;

    /// The stop-and-return-success terminal, always last.
    pub const TERMINAL: i32 = 0x700;
}

/// Bands for around-invoke (per-operation) pipelines.
pub mod invocation {
    /// The ambient-context unit, always first.
    pub const CONTEXT_PROPAGATION: i32 = 0x100;

    /// Class-level contributions.
    pub const CLASS_INTERCEPTORS: i32 = 0x200;

    /// Default (container-level) contributions.
    pub const DEFAULT_INTERCEPTORS: i32 = 0x300;

    /// Operation-level contributions, last among user interceptors.
    pub const OPERATION_INTERCEPTORS: i32 = 0x400;

    /// The target-call terminal, always last.
    pub const TERMINAL: i32 = 0x700;
}

/// Bands for the client and view rings of a view.
pub mod ring {
    /// The ambient-context unit, always first.
    pub const CONTEXT_PROPAGATION: i32 = 0x100;

    /// User ring contributions.
    pub const USER: i32 = 0x200;

    /// The dispatcher that crosses into the next ring, always last.
    pub const DISPATCHER: i32 = 0x600;
}
