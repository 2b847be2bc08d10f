use crate::ipc::helpers::{get_optional_str, get_required_str, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::store::{RosterProvider, SqliteStore};
use log::info;
use rusqlite::Connection;
use serde_json::json;

fn users_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(params, "username")?;
    let first_name = get_required_str(params, "firstName")?;
    let last_name = get_required_str(params, "lastName")?;
    let role = match get_optional_str(params, "role") {
        Some(raw) => Role::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("role must be one of: TEACHER, STUDENT"))?,
        None => Role::Student,
    };

    let store = SqliteStore::new(conn);
    let user_id = store.create_user(&username, &first_name, &last_name, role)?;
    info!("event=user_create role={}", role.as_str());
    Ok(json!({ "userId": user_id, "role": role }))
}

fn students_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let store = SqliteStore::new(conn);
    let students: Vec<serde_json::Value> = store
        .list_students()?
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id,
                "username": s.username,
                "firstName": s.first_name,
                "lastName": s.last_name,
                "displayName": s.display_name(),
            })
        })
        .collect();
    Ok(json!({ "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.create" => Some(with_conn(state, req, users_create)),
        "students.list" => Some(with_conn(state, req, students_list)),
        _ => None,
    }
}
