// handlers/elevated/license/mod.rs - License lifecycle handlers

pub mod issue; // POST /admin/licenses
pub mod list; // GET /admin/licenses, GET /admin/licenses/:id
pub mod transition; // POST /admin/licenses/:id/{extend,pause,resume}

pub use issue::license_issue;
pub use list::{license_list, license_show};
pub use transition::{license_extend, license_pause, license_resume};
