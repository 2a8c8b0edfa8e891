use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn exists(conn: &Connection, table: &str, id: &str) -> rusqlite::Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ? LIMIT 1", table);
    conn.query_row(&sql, [id], |_r| Ok(()))
        .optional()
        .map(|v| v.is_some())
}

fn handle_lecturers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let email = optional_str(req, "email");
    let department = optional_str(req, "department");

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO lecturers(id, name, email, department) VALUES(?, ?, ?, ?)",
        (&id, &name, &email, &department),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "lecturers" })),
        );
    }
    ok(&req.id, json!({ "lecturerId": id }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let faculty = optional_str(req, "faculty");

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, code, name, faculty) VALUES(?, ?, ?, ?)",
        (&id, &code, &name, &faculty),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }
    ok(&req.id, json!({ "subjectId": id }))
}

fn handle_class_units_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO class_units(id, code, name) VALUES(?, ?, ?)",
        (&id, &code, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "class_units" })),
        );
    }
    ok(&req.id, json!({ "classUnitId": id }))
}

fn handle_rooms_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let code = optional_str(req, "code");
    let building = optional_str(req, "building");

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO rooms(id, code, building) VALUES(?, ?, ?)",
        (&id, &code, &building),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "rooms" })),
        );
    }
    ok(&req.id, json!({ "roomId": id }))
}

fn handle_timeslots_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let day_of_week = match req.params.get("dayOfWeek").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing dayOfWeek", None),
    };
    let start_time = match required_str(req, "startTime") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let end_time = match required_str(req, "endTime") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_count = req
        .params
        .get("periodCount")
        .and_then(|v| v.as_i64())
        .unwrap_or(1);

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO timeslots(id, code, day_of_week, start_time, end_time, period_count)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &code, day_of_week, &start_time, &end_time, period_count),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "timeslots" })),
        );
    }
    ok(&req.id, json!({ "timeslotId": id }))
}

fn handle_timeslots_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "timeslots": [] }));
    };
    let mut stmt = match conn.prepare(
        "SELECT id, code, day_of_week, start_time, end_time, period_count
         FROM timeslots
         ORDER BY day_of_week, start_time",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "code": row.get::<_, String>(1)?,
                "dayOfWeek": row.get::<_, i64>(2)?,
                "startTime": row.get::<_, String>(3)?,
                "endTime": row.get::<_, String>(4)?,
                "periodCount": row.get::<_, i64>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(timeslots) => ok(&req.id, json!({ "timeslots": timeslots })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let lecturer_id = match required_str(req, "lecturerId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_unit_id = match required_str(req, "classUnitId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semester = match required_str(req, "semester") {
        Ok(v) => v,
        Err(e) => return e,
    };

    for (table, id) in [
        ("lecturers", &lecturer_id),
        ("subjects", &subject_id),
        ("class_units", &class_unit_id),
    ] {
        match exists(conn, table, id) {
            Ok(true) => {}
            Ok(false) => {
                return err(
                    &req.id,
                    "not_found",
                    format!("no such row in {}", table),
                    Some(json!({ "table": table, "id": id })),
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO assignments(id, lecturer_id, subject_id, class_unit_id, semester)
         VALUES(?, ?, ?, ?, ?)",
        (&id, &lecturer_id, &subject_id, &class_unit_id, &semester),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }
    ok(&req.id, json!({ "assignmentId": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lecturers.create" => Some(handle_lecturers_create(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "classUnits.create" => Some(handle_class_units_create(state, req)),
        "rooms.create" => Some(handle_rooms_create(state, req)),
        "timeslots.create" => Some(handle_timeslots_create(state, req)),
        "timeslots.list" => Some(handle_timeslots_list(state, req)),
        "assignments.create" => Some(handle_assignments_create(state, req)),
        _ => None,
    }
}
