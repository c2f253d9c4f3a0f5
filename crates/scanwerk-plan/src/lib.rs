// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-plan — ScanTailor project handling for Scanwerk.
//
// Loads a project file into index-aligned per-page units, splits it into
// balanced sub-plans, and writes those back out byte-for-byte in the original
// layout so that ScanTailor sees nothing it did not write itself.

pub mod digest;
pub mod partition;
pub mod record;
pub mod store;

pub use digest::{fingerprint, fingerprint_file};
pub use partition::{SubPlan, partition, persist_all, shard_ranges};
pub use record::{Collection, PageUnit, PlanRecord};
pub use store::{PROJECT_EXTENSION, ProcessingPlan};
