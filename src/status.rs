use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::grouping::time_to_minutes;

/// Note stamped on rows the overdue sweep cancels, unless the lecturer
/// already left one.
pub const AUTO_CANCEL_NOTE: &str = "Tự động hủy do đã qua thời gian";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStatus {
    Planned,
    Teaching,
    Done,
    Canceled,
    MakeupPlanned,
    MakeupDone,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Planned => "planned",
            ScheduleStatus::Teaching => "teaching",
            ScheduleStatus::Done => "done",
            ScheduleStatus::Canceled => "canceled",
            ScheduleStatus::MakeupPlanned => "makeup_planned",
            ScheduleStatus::MakeupDone => "makeup_done",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "planned" => Some(ScheduleStatus::Planned),
            "teaching" => Some(ScheduleStatus::Teaching),
            "done" => Some(ScheduleStatus::Done),
            "canceled" => Some(ScheduleStatus::Canceled),
            "makeup_planned" => Some(ScheduleStatus::MakeupPlanned),
            "makeup_done" => Some(ScheduleStatus::MakeupDone),
            _ => None,
        }
    }

    /// The completed state a row lands in when its time has run out:
    /// makeup rows finish on their own branch of the diagram.
    fn completed(self) -> ScheduleStatus {
        match self {
            ScheduleStatus::MakeupPlanned | ScheduleStatus::MakeupDone => {
                ScheduleStatus::MakeupDone
            }
            _ => ScheduleStatus::Done,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransitionError {
    pub code: &'static str,
    pub message: String,
}

impl TransitionError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn db(e: rusqlite::Error) -> Self {
        Self::new("db_update_failed", e.to_string())
    }
}

fn current_status(conn: &Connection, schedule_id: &str) -> Result<ScheduleStatus, TransitionError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM schedules WHERE id = ?",
            [schedule_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| TransitionError::new("db_query_failed", e.to_string()))?;
    let raw = raw.ok_or_else(|| TransitionError::new("not_found", "schedule not found"))?;
    ScheduleStatus::parse(&raw)
        .ok_or_else(|| TransitionError::new("invalid_state", format!("unknown status: {}", raw)))
}

pub fn has_attendance(conn: &Connection, schedule_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM attendance_records WHERE schedule_id = ? LIMIT 1",
        [schedule_id],
        |_r| Ok(()),
    )
    .optional()
    .map(|v| v.is_some())
}

fn set_status(
    conn: &Connection,
    schedule_id: &str,
    status: ScheduleStatus,
) -> Result<(), TransitionError> {
    conn.execute(
        "UPDATE schedules SET status = ? WHERE id = ?",
        (status.as_str(), schedule_id),
    )
    .map_err(TransitionError::db)?;
    Ok(())
}

/// `planned` -> `teaching`, strictly.
pub fn start_session(conn: &Connection, schedule_id: &str) -> Result<(), TransitionError> {
    match current_status(conn, schedule_id)? {
        ScheduleStatus::Planned => set_status(conn, schedule_id, ScheduleStatus::Teaching),
        other => Err(TransitionError::new(
            "invalid_state",
            format!("cannot start a session in status {}", other.as_str()),
        )),
    }
}

/// `planned`/`teaching` -> `done`, gated on at least one attendance record.
pub fn finish_session(conn: &Connection, schedule_id: &str) -> Result<(), TransitionError> {
    match current_status(conn, schedule_id)? {
        ScheduleStatus::Planned | ScheduleStatus::Teaching => {}
        other => {
            return Err(TransitionError::new(
                "invalid_state",
                format!("cannot finish a session in status {}", other.as_str()),
            ))
        }
    }
    let attended = has_attendance(conn, schedule_id)
        .map_err(|e| TransitionError::new("db_query_failed", e.to_string()))?;
    if !attended {
        return Err(TransitionError::new(
            "precondition_failed",
            "must take attendance first",
        ));
    }
    set_status(conn, schedule_id, ScheduleStatus::Done)
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub scanned: usize,
    pub done: usize,
    pub canceled: usize,
    pub failed: usize,
}

struct SweepRow {
    id: String,
    session_date: String,
    start_time: String,
    end_time: String,
    status: ScheduleStatus,
    note: Option<String>,
}

fn open_rows(conn: &Connection) -> rusqlite::Result<Vec<SweepRow>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.session_date, COALESCE(t.start_time, ''), COALESCE(t.end_time, ''),
                s.status, s.note
         FROM schedules s
         LEFT JOIN timeslots t ON t.id = s.timeslot_id
         WHERE s.status IN ('planned', 'teaching', 'makeup_planned')
         ORDER BY s.session_date, s.rowid",
    )?;
    stmt.query_map([], |row| {
        let raw: String = row.get(4)?;
        Ok(SweepRow {
            id: row.get(0)?,
            session_date: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            status: ScheduleStatus::parse(&raw).unwrap_or(ScheduleStatus::Planned),
            note: row.get(5)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

/// Periodic sweep: every open row whose session start is strictly in the
/// past is closed out — `done` when attendance was taken, `canceled` (with
/// an auto note when none was set) otherwise.
///
/// Rows are written one by one with no enclosing transaction; a failed row
/// is logged and skipped, and the next run picks it up again.
pub fn sweep_overdue(conn: &Connection, today: &str, now_minutes: i64) -> SweepSummary {
    let rows = match open_rows(conn) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("sweep_overdue: scan failed: {}", e);
            return SweepSummary {
                failed: 1,
                ..SweepSummary::default()
            };
        }
    };

    let mut summary = SweepSummary::default();
    for row in rows {
        summary.scanned += 1;
        let started = row.session_date.as_str() < today
            || (row.session_date == today && time_to_minutes(&row.start_time) < now_minutes);
        if !started {
            continue;
        }

        let outcome = sweep_row(conn, &row);
        match outcome {
            Ok(Some(ScheduleStatus::Canceled)) => summary.canceled += 1,
            Ok(Some(_)) => summary.done += 1,
            Ok(None) => {}
            Err(e) => {
                eprintln!("sweep_overdue: schedule {}: {}", row.id, e);
                summary.failed += 1;
            }
        }
    }
    summary
}

fn sweep_row(conn: &Connection, row: &SweepRow) -> rusqlite::Result<Option<ScheduleStatus>> {
    if has_attendance(conn, &row.id)? {
        let next = row.status.completed();
        conn.execute(
            "UPDATE schedules SET status = ? WHERE id = ? AND status = ?",
            (next.as_str(), &row.id, row.status.as_str()),
        )?;
        return Ok(Some(next));
    }

    let blank_note = row.note.as_deref().map(str::trim).unwrap_or("").is_empty();
    let changed = if blank_note {
        conn.execute(
            "UPDATE schedules SET status = 'canceled', note = ? WHERE id = ? AND status = ?",
            (AUTO_CANCEL_NOTE, &row.id, row.status.as_str()),
        )?
    } else {
        conn.execute(
            "UPDATE schedules SET status = 'canceled' WHERE id = ? AND status = ?",
            (&row.id, row.status.as_str()),
        )?
    };
    // A concurrent user action may have moved the row first; that's fine.
    Ok(if changed > 0 {
        Some(ScheduleStatus::Canceled)
    } else {
        None
    })
}

/// End-of-day pass: every open row from a previous day, or from today with
/// its end time already behind us, is promoted straight to its completed
/// state. Unlike `sweep_overdue`, this pass does NOT look at attendance;
/// the two rules intentionally remain separate operations.
pub fn close_day(conn: &Connection, today: &str, now_minutes: i64) -> SweepSummary {
    let rows = match open_rows(conn) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("close_day: scan failed: {}", e);
            return SweepSummary {
                failed: 1,
                ..SweepSummary::default()
            };
        }
    };

    let mut summary = SweepSummary::default();
    for row in rows {
        summary.scanned += 1;
        let over = row.session_date.as_str() < today
            || (row.session_date == today && time_to_minutes(&row.end_time) < now_minutes);
        if !over {
            continue;
        }

        let next = row.status.completed();
        match conn.execute(
            "UPDATE schedules SET status = ? WHERE id = ? AND status = ?",
            (next.as_str(), &row.id, row.status.as_str()),
        ) {
            Ok(n) if n > 0 => summary.done += 1,
            Ok(_) => {}
            Err(e) => {
                eprintln!("close_day: schedule {}: {}", row.id, e);
                summary.failed += 1;
            }
        }
    }
    summary
}
