use onechat_shared::types::RequestStatus;
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::messages::invalid_column;
use crate::models::StoredRequest;

const REQUEST_COLUMNS: &str =
    "id, flag, time, request_type, sub_type, user_id, group_id, comment, status, is_read";

impl Database {
    /// Store a request. Returns `false` when a request with the same flag already exists.
    pub fn save_request(&self, request: &StoredRequest) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO requests (id, flag, time, request_type, sub_type, user_id,
                 group_id, comment, status, is_read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                request.id,
                request.flag,
                request.time,
                request.request_type,
                request.sub_type,
                request.user_id,
                request.group_id,
                request.comment,
                request.status.as_str(),
                request.is_read,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Requests newest first, optionally only those still pending.
    pub fn list_requests(&self, pending_only: bool) -> Result<Vec<StoredRequest>> {
        let filter = if pending_only {
            "WHERE status = 'pending'"
        } else {
            ""
        };
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests {filter} ORDER BY time DESC"
        ))?;

        let rows = stmt.query_map([], row_to_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    pub fn set_request_status(&self, flag: &str, status: RequestStatus) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE requests SET status = ?2, is_read = 1 WHERE flag = ?1",
            params![flag, status.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Mark every request as read. Returns the number of rows that changed.
    pub fn mark_requests_read(&self) -> Result<usize> {
        let affected = self
            .conn()
            .execute("UPDATE requests SET is_read = 1 WHERE is_read = 0", [])?;
        Ok(affected)
    }
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRequest> {
    let status: String = row.get(8)?;
    let status = RequestStatus::parse(&status).ok_or_else(|| invalid_column(8, "status", status))?;

    Ok(StoredRequest {
        id: row.get(0)?,
        flag: row.get(1)?,
        time: row.get(2)?,
        request_type: row.get(3)?,
        sub_type: row.get(4)?,
        user_id: row.get(5)?,
        group_id: row.get(6)?,
        comment: row.get(7)?,
        status,
        is_read: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn friend_request(flag: &str, time: i64) -> StoredRequest {
        StoredRequest {
            id: StoredRequest::make_id("friend", flag, time),
            flag: flag.to_string(),
            time,
            request_type: "friend".to_string(),
            sub_type: None,
            user_id: 2002,
            group_id: None,
            comment: "hi, add me".to_string(),
            status: RequestStatus::Pending,
            is_read: false,
        }
    }

    #[test]
    fn duplicate_flag_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();

        assert!(db.save_request(&friend_request("f1", 100)).unwrap());
        assert!(!db.save_request(&friend_request("f1", 100)).unwrap());
        assert!(db.save_request(&friend_request("f2", 200)).unwrap());

        let all = db.list_requests(false).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].flag, "f2");
        assert_eq!(all[1].id, "friend_f1_100");
    }

    #[test]
    fn resolve_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        db.save_request(&friend_request("f1", 100)).unwrap();
        db.save_request(&friend_request("f2", 200)).unwrap();

        assert!(db.set_request_status("f1", RequestStatus::Approved).unwrap());
        assert!(!db.set_request_status("missing", RequestStatus::Rejected).unwrap());

        let pending = db.list_requests(true).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].flag, "f2");

        assert_eq!(db.mark_requests_read().unwrap(), 1);
        assert!(db.list_requests(false).unwrap().iter().all(|r| r.is_read));
    }
}
