use rusqlite::{params_from_iter, types::Value, Connection};
use serde::Serialize;

/// Minutes since midnight for a "HH:MM" or "HH:MM:SS" string.
/// Empty or unparseable input yields 0 rather than an error; callers that
/// need to distinguish "missing" check the raw string instead.
pub fn time_to_minutes(raw: &str) -> i64 {
    let t = raw.trim();
    if t.is_empty() {
        return 0;
    }
    let mut parts = t.split(':');
    let (Some(h), Some(m)) = (parts.next(), parts.next()) else {
        return 0;
    };
    let (Ok(h), Ok(m)) = (h.parse::<i64>(), m.parse::<i64>()) else {
        return 0;
    };
    h * 60 + m
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Morning,
    Afternoon,
    Evening,
    None,
}

impl Shift {
    pub fn as_str(self) -> &'static str {
        match self {
            Shift::Morning => "morning",
            Shift::Afternoon => "afternoon",
            Shift::Evening => "evening",
            Shift::None => "none",
        }
    }
}

/// Period number trailing the `T` marker in a timeslot code ("T7" -> 7).
fn period_from_code(code: &str) -> Option<i64> {
    let t = code.trim().to_ascii_uppercase();
    let (_, digits) = t.rsplit_once('T')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Coarse time-of-day bucket for a timeslot. The period number in the code
/// wins; codes that don't carry one (or carry one outside the known grid)
/// fall back to fixed clock boundaries on the start time.
pub fn shift_of(code: &str, start_time: &str) -> Shift {
    match period_from_code(code) {
        Some(1..=6) => return Shift::Morning,
        Some(7..=12) => return Shift::Afternoon,
        Some(13..=15) => return Shift::Evening,
        _ => {}
    }
    let start = time_to_minutes(start_time);
    if start >= 7 * 60 && start < 12 * 60 {
        Shift::Morning
    } else if start >= 12 * 60 && start < 18 * 60 {
        Shift::Afternoon
    } else if start >= 18 * 60 {
        Shift::Evening
    } else {
        Shift::None
    }
}

/// One hydrated calendar row, ready for grouping and display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub id: String,
    pub assignment_id: String,
    pub session_date: String,
    pub timeslot_code: String,
    pub start_time: String,
    pub end_time: String,
    pub room_label: String,
    pub status: String,
    pub note: Option<String>,
    pub makeup_of: Option<String>,
}

impl SessionRow {
    fn has_times(&self) -> bool {
        !self.timeslot_code.trim().is_empty()
            && !self.start_time.trim().is_empty()
            && !self.end_time.trim().is_empty()
    }

    fn shift(&self) -> Shift {
        shift_of(&self.timeslot_code, &self.start_time)
    }
}

/// Display label for a room: code, else building, else "-".
pub fn room_label(code: Option<&str>, building: Option<&str>) -> String {
    for candidate in [code, building] {
        if let Some(v) = candidate {
            let v = v.trim();
            if !v.is_empty() {
                return v.to_string();
            }
        }
    }
    "-".to_string()
}

const MAX_GAP_MINUTES: i64 = 60;

/// Whether `next` continues the run ending at `prev`. Only the
/// prev-before-next direction is ever asked: the grouper scans left to
/// right and measures the gap from `prev.end_time` to `next.start_time`.
/// Rows with no resolvable timeslot never join a run.
pub fn is_adjacent(prev: &SessionRow, next: &SessionRow) -> bool {
    if !prev.has_times() || !next.has_times() {
        return false;
    }
    if prev.session_date != next.session_date || prev.assignment_id != next.assignment_id {
        return false;
    }
    if prev.room_label.trim() != next.room_label.trim() {
        return false;
    }
    if prev.shift() != next.shift() {
        return false;
    }
    let gap = time_to_minutes(&next.start_time) - time_to_minutes(&prev.end_time);
    (0..=MAX_GAP_MINUTES).contains(&gap)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedSession {
    pub session_date: String,
    pub assignment_id: String,
    pub rows: Vec<SessionRow>,
}

/// Merge contiguous rows into logical teaching sessions.
///
/// Input must be pre-sorted by (session_date, start_time). The scan is
/// greedy and order-dependent: each group grows by testing the candidate
/// against the last row already absorbed, and stops at the first
/// non-adjacent candidate. Ties resolve by input order; there is no
/// backtracking and no search for a globally better partition.
pub fn group_sessions(rows: Vec<SessionRow>) -> Vec<GroupedSession> {
    let mut consumed = vec![false; rows.len()];
    let mut sessions = Vec::new();

    for i in 0..rows.len() {
        if consumed[i] {
            continue;
        }
        consumed[i] = true;
        let mut members = vec![rows[i].clone()];
        let mut last = i;

        for j in (i + 1)..rows.len() {
            if consumed[j] {
                continue;
            }
            if is_adjacent(&rows[last], &rows[j]) {
                consumed[j] = true;
                members.push(rows[j].clone());
                last = j;
            } else {
                break;
            }
        }

        sessions.push(GroupedSession {
            session_date: members[0].session_date.clone(),
            assignment_id: members[0].assignment_id.clone(),
            rows: members,
        });
    }

    sessions
}

/// Load a lecturer's calendar rows for grouping, hydrated and pre-sorted by
/// (session_date, start_time). Rows whose timeslot no longer resolves come
/// back with empty time fields and group as singletons.
pub fn fetch_session_rows(
    conn: &Connection,
    lecturer_id: &str,
    from: Option<&str>,
    to: Option<&str>,
    semester: Option<&str>,
) -> rusqlite::Result<Vec<SessionRow>> {
    let mut sql = String::from(
        "SELECT s.id, s.assignment_id, s.session_date,
                COALESCE(t.code, ''), COALESCE(t.start_time, ''), COALESCE(t.end_time, ''),
                r.code, r.building, s.status, s.note, s.makeup_of
         FROM schedules s
         JOIN assignments a ON a.id = s.assignment_id
         LEFT JOIN timeslots t ON t.id = s.timeslot_id
         LEFT JOIN rooms r ON r.id = s.room_id
         WHERE a.lecturer_id = ?",
    );
    let mut binds: Vec<Value> = vec![Value::from(lecturer_id.to_string())];
    if let Some(from) = from {
        sql.push_str(" AND s.session_date >= ?");
        binds.push(Value::from(from.to_string()));
    }
    if let Some(to) = to {
        sql.push_str(" AND s.session_date <= ?");
        binds.push(Value::from(to.to_string()));
    }
    if let Some(semester) = semester {
        sql.push_str(" AND a.semester = ?");
        binds.push(Value::from(semester.to_string()));
    }
    sql.push_str(" ORDER BY s.session_date, COALESCE(t.start_time, ''), s.rowid");

    let mut stmt = conn.prepare(&sql)?;
    stmt.query_map(params_from_iter(binds), |row| {
        let room_code: Option<String> = row.get(6)?;
        let building: Option<String> = row.get(7)?;
        Ok(SessionRow {
            id: row.get(0)?,
            assignment_id: row.get(1)?,
            session_date: row.get(2)?,
            timeslot_code: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            room_label: room_label(room_code.as_deref(), building.as_deref()),
            status: row.get(8)?,
            note: row.get(9)?,
            makeup_of: row.get(10)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}
