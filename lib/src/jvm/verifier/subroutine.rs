use super::{verify_guarantee, Operand, VerificationFailure};

/// Which locals have been written to inside each subroutine currently being executed
///
/// Old (pre-Java 7) class files can call subroutines with `jsr` and return from them with `ret`.
/// A subroutine is shared by all of its callers, so after `ret` the locals the subroutine never
/// touched must be restored to what they were at the particular `jsr` being returned to. Tracking
/// the written ("dirty") locals of each nesting level is what makes that possible.
///
/// The outermost subroutine is first. An empty list means the code is not inside any subroutine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubroutineModifications {
    levels: Vec<SubroutineLevel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineLevel {
    /// Offset of the `jsr` that entered this level
    pub call_bci: usize,

    /// One entry per local variable slot
    pub dirty: Vec<bool>,
}

impl SubroutineModifications {
    /// Number of nested subroutines being executed
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[SubroutineLevel] {
        &self.levels
    }

    /// Modifications after calling another subroutine from `call_bci`
    pub fn enter(&self, call_bci: usize, max_locals: usize) -> SubroutineModifications {
        let mut levels = self.levels.clone();
        levels.push(SubroutineLevel {
            call_bci,
            dirty: vec![false; max_locals],
        });
        SubroutineModifications { levels }
    }

    /// Record a write to a local in the innermost subroutine
    pub fn mark_dirty(&mut self, index: usize) {
        if let Some(level) = self.levels.last_mut() {
            if let Some(dirty) = level.dirty.get_mut(index) {
                *dirty = true;
            }
        }
    }

    /// Fold another path's modifications into these ones
    ///
    /// Levels are lined up starting from the outermost one and only the levels both paths share
    /// are combined. Returns whether any new local became dirty.
    pub fn merge(&mut self, other: &SubroutineModifications) -> bool {
        let mut changed = false;
        for (ours, theirs) in self.levels.iter_mut().zip(&other.levels) {
            for (our_dirty, their_dirty) in ours.dirty.iter_mut().zip(&theirs.dirty) {
                if *their_dirty && !*our_dirty {
                    *our_dirty = true;
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Compute the locals that control resumes with after a `ret`
///
///   - `current` are the locals at the `ret` itself, modified by `current_mods`
///   - `at_jsr` are the locals just before the `jsr` being returned to, inside `jsr_mods`
///
/// Locals written anywhere in the subroutines being exited keep their current value. All others
/// get back the value they had at the call site. The returned modifications have the depth of the
/// call site, with the written locals also marked dirty in the (new) innermost level.
pub fn subroutine_return_locals(
    current: &[Operand],
    current_mods: &SubroutineModifications,
    at_jsr: &[Operand],
    jsr_mods: &SubroutineModifications,
) -> Result<(Vec<Operand>, SubroutineModifications), VerificationFailure> {
    let depth = current_mods.depth();
    let depth_ret = jsr_mods.depth();
    verify_guarantee(depth > 0, || String::from("RET outside of a subroutine"))?;
    verify_guarantee(depth_ret < depth, || {
        String::from("RET increases subroutine depth.")
    })?;

    // Everything that was written in any of the levels being unwound
    let mut written = current_mods.levels[depth_ret].dirty.clone();
    for level in &current_mods.levels[depth_ret + 1..] {
        for (written, dirty) in written.iter_mut().zip(&level.dirty) {
            *written |= *dirty;
        }
    }

    let mut mods = SubroutineModifications {
        levels: current_mods.levels[..depth_ret].to_vec(),
    };
    let locals = current
        .iter()
        .zip(at_jsr)
        .enumerate()
        .map(|(index, (current, at_jsr))| {
            if written.get(index).copied().unwrap_or(false) {
                mods.mark_dirty(index);
                current.clone()
            } else {
                at_jsr.clone()
            }
        })
        .collect();

    Ok((locals, mods))
}
