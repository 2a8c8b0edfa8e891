use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "lichday.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lecturers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            department TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            faculty TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_units(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rooms(
            id TEXT PRIMARY KEY,
            code TEXT,
            building TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timeslots(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            day_of_week INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            period_count INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    ensure_timeslots_period_count(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            lecturer_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_unit_id TEXT NOT NULL,
            semester TEXT NOT NULL,
            FOREIGN KEY(lecturer_id) REFERENCES lecturers(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(class_unit_id) REFERENCES class_units(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_lecturer ON assignments(lecturer_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_semester ON assignments(semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedules(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            session_date TEXT NOT NULL,
            timeslot_id TEXT NOT NULL,
            room_id TEXT,
            status TEXT NOT NULL DEFAULT 'planned',
            note TEXT,
            makeup_of TEXT,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(timeslot_id) REFERENCES timeslots(id),
            FOREIGN KEY(room_id) REFERENCES rooms(id),
            UNIQUE(assignment_id, session_date, timeslot_id)
        )",
        [],
    )?;
    ensure_schedules_makeup_of(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_assignment ON schedules(assignment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_date ON schedules(session_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_status ON schedules(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            student_code TEXT NOT NULL,
            present INTEGER NOT NULL DEFAULT 1,
            recorded_at TEXT,
            FOREIGN KEY(schedule_id) REFERENCES schedules(id),
            UNIQUE(schedule_id, student_code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_schedule ON attendance_records(schedule_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS leave_requests(
            id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            lecturer_id TEXT NOT NULL,
            reason TEXT NOT NULL,
            proof_url TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            requested_at TEXT NOT NULL,
            decided_at TEXT,
            decided_by TEXT,
            FOREIGN KEY(schedule_id) REFERENCES schedules(id),
            FOREIGN KEY(lecturer_id) REFERENCES lecturers(id),
            UNIQUE(schedule_id, lecturer_id)
        )",
        [],
    )?;
    ensure_leave_requests_proof_url(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_leave_requests_lecturer ON leave_requests(lecturer_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS makeup_requests(
            id TEXT PRIMARY KEY,
            leave_request_id TEXT NOT NULL,
            suggested_date TEXT NOT NULL,
            timeslot_id TEXT NOT NULL,
            room_id TEXT,
            note TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            requested_at TEXT NOT NULL,
            decided_at TEXT,
            decided_by TEXT,
            FOREIGN KEY(leave_request_id) REFERENCES leave_requests(id),
            FOREIGN KEY(timeslot_id) REFERENCES timeslots(id),
            FOREIGN KEY(room_id) REFERENCES rooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_makeup_requests_leave ON makeup_requests(leave_request_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications(
            id TEXT PRIMARY KEY,
            lecturer_id TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(lecturer_id) REFERENCES lecturers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_lecturer ON notifications(lecturer_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_timeslots_period_count(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "timeslots", "period_count")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE timeslots ADD COLUMN period_count INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

fn ensure_schedules_makeup_of(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "schedules", "makeup_of")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE schedules ADD COLUMN makeup_of TEXT", [])?;
    Ok(())
}

fn ensure_leave_requests_proof_url(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "leave_requests", "proof_url")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE leave_requests ADD COLUMN proof_url TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
