/// Knobs for how strictly methods are verified
#[derive(Debug, Clone)]
pub struct Settings {
    /// Retry version 50 methods without their stack map table if verifying with it fails
    ///
    /// This mirrors the failover to the type-inferring verifier that Java 6 class files get.
    pub allow_fallback: bool,

    /// Is `boolean[]` a separate array kind from `byte[]`?
    ///
    /// This is the case on Java 9 and later runtimes. When this is `false`, `newarray T_BOOLEAN`
    /// produces a `byte[]` and `Z` in descriptors behaves like `B`.
    pub boolean_arrays_distinct: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            allow_fallback: true,
            boolean_arrays_distinct: true,
        }
    }
}
