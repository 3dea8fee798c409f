//! Key layout in the record store.

pub fn document_key(id: &str) -> String {
    format!("md:{}", id)
}

pub fn comments_key(id: &str) -> String {
    format!("md:{}:comments", id)
}

pub fn owner_files_key(owner_id: &str) -> String {
    format!("user:{}:files", owner_id)
}
