use rusqlite::Connection;
use uuid::Uuid;

fn insert(conn: &Connection, lecturer_id: &str, title: &str, body: &str) -> rusqlite::Result<()> {
    let created_at = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO notifications(id, lecturer_id, title, body, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            lecturer_id,
            title,
            body,
            created_at,
        ),
    )?;
    Ok(())
}

/// Fire-and-forget: a notification that cannot be queued must never fail
/// the workflow that produced it.
pub fn notify_lecturer(conn: &Connection, lecturer_id: &str, title: &str, body: &str) {
    if let Err(e) = insert(conn, lecturer_id, title, body) {
        eprintln!("notify: dropping notification for {}: {}", lecturer_id, e);
    }
}
