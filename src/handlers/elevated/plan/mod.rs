// handlers/elevated/plan/mod.rs - Plan catalog handlers

pub mod catalog; // GET /admin/plans, PUT /admin/plans/:tier

pub use catalog::{plan_list, plan_update};
