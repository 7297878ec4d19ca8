//! Benchmark profiles and utilities for mathpool.
//!
//! Provides a synthetic per-frame workload shaped like a scene graph
//! update, used by the criterion benches and for soak testing:
//!
//! - [`SceneProfile::reference`]: 1K nodes, four scratch vectors each
//! - [`SceneProfile::stress`]: 10K nodes with heavier mark churn
//! - [`Scene`]: the marked node state plus the per-frame update

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use mathpool_arena::{MathContext, MathError, MathId, MathType};

/// Shape of the synthetic workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneProfile {
    /// Nodes, each owning one marked local matrix.
    pub nodes: usize,
    /// Transient vectors imported per node per frame.
    pub scratch_per_node: usize,
    /// Every `churn_every`-th node replaces its matrix each frame.
    pub churn_every: usize,
}

impl SceneProfile {
    /// 1K nodes, four scratch vectors each, 1 in 16 nodes churned.
    pub fn reference() -> Self {
        Self {
            nodes: 1_000,
            scratch_per_node: 4,
            churn_every: 16,
        }
    }

    /// 10K nodes, eight scratch vectors each, 1 in 4 nodes churned.
    pub fn stress() -> Self {
        Self {
            nodes: 10_000,
            scratch_per_node: 8,
            churn_every: 4,
        }
    }
}

/// Deterministic pseudo-random float in `[0, 1)` for node `i`.
pub fn node_seed(seed: u64, i: usize) -> f32 {
    let x = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(i as u64 * 1442695040888963407);
    (x >> 40) as f32 / (1u64 << 24) as f32
}

fn local_matrix(seed: u64, i: usize) -> [f32; 16] {
    let s = node_seed(seed, i);
    let mut m = mathpool_core::IDENTITY_MATRIX;
    m[12] = s;
    m[13] = 1.0 - s;
    m[14] = s * 0.5;
    m
}

/// Marked per-node state driven one frame at a time.
#[derive(Debug)]
pub struct Scene {
    profile: SceneProfile,
    seed: u64,
    locals: Vec<MathId>,
    frames: u64,
}

impl Scene {
    /// Mark one local matrix per node.
    pub fn build(
        ctx: &mut MathContext,
        profile: SceneProfile,
        seed: u64,
    ) -> Result<Self, MathError> {
        let mut locals = Vec::with_capacity(profile.nodes);
        for i in 0..profile.nodes {
            let t = ctx.matrix(&local_matrix(seed, i))?;
            locals.push(ctx.mark(t)?);
        }
        Ok(Self {
            profile,
            seed,
            locals,
            frames: 0,
        })
    }

    /// Marked node handles.
    pub fn locals(&self) -> &[MathId] {
        &self.locals
    }

    /// Run one frame and return a checksum of everything read.
    ///
    /// Each node imports its scratch vectors, reads them back together
    /// with its local matrix, and churned nodes swap their matrix for a
    /// fresh marked copy. Ends with `ctx.frame()`.
    pub fn run_frame(&mut self, ctx: &mut MathContext) -> Result<f32, MathError> {
        let mut checksum = 0.0f32;
        let phase = self.frames as f32;
        for (i, local) in self.locals.iter_mut().enumerate() {
            for k in 0..self.profile.scratch_per_node {
                let v = [phase, i as f32, k as f32, 1.0];
                let t = ctx.vec4(&v)?;
                checksum += ctx.value(t)[1];
            }
            checksum += ctx.value(*local)[12];

            if self.profile.churn_every > 0 && i % self.profile.churn_every == 0 {
                let mut m = local_matrix(self.seed, i);
                m[15] = 1.0 + phase;
                let fresh = ctx.matrix(&m)?;
                let kept = ctx.mark(fresh)?;
                ctx.unmark(*local)?;
                *local = kept;
            }
        }
        ctx.frame();
        self.frames += 1;
        Ok(checksum)
    }

    /// Release every node.
    pub fn teardown(self, ctx: &mut MathContext) -> Result<(), MathError> {
        for local in self.locals {
            ctx.unmark(local)?;
        }
        Ok(())
    }
}

/// Import `count` vectors one at a time and return the last handle.
pub fn import_scratch(ctx: &mut MathContext, count: usize) -> Result<MathId, MathError> {
    let mut last = MathId::NULL;
    for i in 0..count {
        last = ctx.import(Some(&[i as f32; 4]), MathType::Vec4, 1)?;
    }
    Ok(last)
}
