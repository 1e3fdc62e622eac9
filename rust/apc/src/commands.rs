//! The command surface.
//!
//! Every method has the same shape: build the ordered arguments, issue the
//! keyword through the request machinery, and project the accumulated data
//! segments into the return type. Commands differ in projection only.

use crate::client::Client;
use crate::errors::ClientError;

/// Job category filter for [`Client::list_jobs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    All,
    Blend,
    Outbound,
    Inbound,
    Managed,
}

impl JobType {
    const fn as_char(self) -> char {
        match self {
            JobType::All => 'A',
            JobType::Blend => 'B',
            JobType::Outbound => 'O',
            JobType::Inbound => 'I',
            JobType::Managed => 'M',
        }
    }

    const fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(JobType::All),
            'B' => Some(JobType::Blend),
            'O' => Some(JobType::Outbound),
            'I' => Some(JobType::Inbound),
            'M' => Some(JobType::Managed),
            _ => None,
        }
    }
}

/// Whether a job is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Active,
    Inactive,
}

impl JobStatus {
    const fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(JobStatus::Active),
            'I' => Some(JobStatus::Inactive),
            _ => None,
        }
    }
}

/// One dialing job known to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_type: JobType,
    pub name: String,
    pub status: JobStatus,
}

/// Call-list direction selector used by the field commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    Outbound,
    Inbound,
}

impl ListType {
    const fn as_char(self) -> char {
        match self {
            ListType::Outbound => 'O',
            ListType::Inbound => 'I',
        }
    }
}

/// A customer-record field definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataField {
    pub name: String,
}

/// A customer-record field with its current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub name: String,
    pub field_type: String,
    pub length: u32,
    pub value: String,
}

/// The agent's current place in the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentState {
    /// `S7000x` state code.
    pub code: String,
    /// The job the state is scoped to, when the server reports one.
    pub job_name: Option<String>,
}

impl AgentState {
    pub const ON_CALL: &'static str = "S70000";
    pub const READY_FOR_CALL: &'static str = "S70001";
    pub const HAS_JOINED_JOB: &'static str = "S70002";
    pub const HAS_SELECTED_JOB: &'static str = "S70003";
    pub const LOGGED_ON: &'static str = "S70004";
}

impl Client {
    /// Issue a command and wait for its success response, discarding any
    /// data body.
    async fn simple_command(&self, keyword: &str, args: Vec<String>) -> Result<(), ClientError> {
        self.data_command(keyword, args).await.map(|_| ())
    }

    /// Issue a command and return its accumulated data segments.
    async fn data_command(
        &self,
        keyword: &str,
        args: Vec<String>,
    ) -> Result<Vec<String>, ClientError> {
        let mut request = self.invoke_command(keyword, args).await?;
        request.collect().await
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Log the agent on.
    pub async fn logon(&self, agent_name: &str, password: &str) -> Result<(), ClientError> {
        self.simple_command("AGTLogon", vec![agent_name.to_owned(), password.to_owned()])
            .await
    }

    /// Log the agent off. The server then terminates the session; the
    /// paired driver observes it and returns `Ok(())`.
    pub async fn logoff(&self) -> Result<(), ClientError> {
        self.simple_command("AGTLogoff", Vec::new()).await
    }

    /// Enable server-side echo of commands into the session log.
    pub async fn echo_on(&self) -> Result<(), ClientError> {
        self.simple_command("AGTEchoOn", Vec::new()).await
    }

    /// Disable server-side echo.
    pub async fn echo_off(&self) -> Result<(), ClientError> {
        self.simple_command("AGTEchoOff", Vec::new()).await
    }

    /// Start server-side IO tracing for this session.
    pub async fn log_io_start(&self) -> Result<(), ClientError> {
        self.simple_command("AGTLogIoStart", Vec::new()).await
    }

    /// Stop server-side IO tracing.
    pub async fn log_io_stop(&self) -> Result<(), ClientError> {
        self.simple_command("AGTLogIoStop", Vec::new()).await
    }

    // ------------------------------------------------------------------
    // Headset
    // ------------------------------------------------------------------

    /// Reserve the given headset for this agent.
    pub async fn reserve_headset(&self, headset_id: u32) -> Result<(), ClientError> {
        self.simple_command("AGTReserveHeadset", vec![headset_id.to_string()])
            .await
    }

    /// Connect the reserved headset. The dialer places a call to it.
    pub async fn connect_headset(&self) -> Result<(), ClientError> {
        self.simple_command("AGTConnHeadset", Vec::new()).await
    }

    /// Disconnect the headset, keeping the reservation.
    pub async fn disconnect_headset(&self) -> Result<(), ClientError> {
        self.simple_command("AGTDisconnHeadset", Vec::new()).await
    }

    /// Release the headset reservation.
    pub async fn free_headset(&self) -> Result<(), ClientError> {
        self.simple_command("AGTFreeHeadset", Vec::new()).await
    }

    // ------------------------------------------------------------------
    // Job lifecycle
    // ------------------------------------------------------------------

    /// List jobs of the given category. Malformed entries are skipped.
    pub async fn list_jobs(&self, job_type: JobType) -> Result<Vec<Job>, ClientError> {
        let segments = self
            .data_command("AGTListJobs", vec![job_type.as_char().to_string()])
            .await?;
        Ok(segments.iter().filter_map(|s| parse_job(s)).collect())
    }

    /// Attach this session to a job.
    pub async fn attach_job(&self, job_name: &str) -> Result<(), ClientError> {
        self.simple_command("AGTAttachJob", vec![job_name.to_owned()])
            .await
    }

    /// Detach from the current job.
    pub async fn detach_job(&self) -> Result<(), ClientError> {
        self.simple_command("AGTDetachJob", Vec::new()).await
    }

    /// List the call lists configured on the server.
    pub async fn list_call_lists(&self) -> Result<Vec<String>, ClientError> {
        self.data_command("AGTListCallLists", Vec::new()).await
    }

    /// List the fields of one call list.
    pub async fn list_call_fields(&self, list_name: &str) -> Result<Vec<String>, ClientError> {
        self.data_command("AGTListCallFields", vec![list_name.to_owned()])
            .await
    }

    /// List the customer-record fields of the attached job's list.
    /// Malformed entries are skipped.
    pub async fn list_data_fields(
        &self,
        list_type: ListType,
    ) -> Result<Vec<DataField>, ClientError> {
        let segments = self
            .data_command("AGTListDataFields", vec![list_type.as_char().to_string()])
            .await?;
        Ok(segments
            .iter()
            .filter_map(|s| {
                let parts: Vec<&str> = s.split(',').collect();
                (parts.len() == 4).then(|| DataField {
                    name: parts[0].to_owned(),
                })
            })
            .collect())
    }

    /// Select a field to be included in call-delivery notifications.
    pub async fn set_data_field(
        &self,
        list_type: ListType,
        field_name: &str,
    ) -> Result<(), ClientError> {
        self.simple_command(
            "AGTSetDataField",
            vec![list_type.as_char().to_string(), field_name.to_owned()],
        )
        .await
    }

    /// Select the key field identifying records in call-delivery
    /// notifications.
    pub async fn set_notify_key_field(
        &self,
        list_type: ListType,
        field_name: &str,
    ) -> Result<(), ClientError> {
        self.simple_command(
            "AGTSetNotifyKeyField",
            vec![list_type.as_char().to_string(), field_name.to_owned()],
        )
        .await
    }

    /// List the key fields currently selected.
    pub async fn list_keys(&self) -> Result<Vec<String>, ClientError> {
        self.data_command("AGTListKeys", Vec::new()).await
    }

    /// Report the agent's current state.
    pub async fn list_state(&self) -> Result<AgentState, ClientError> {
        let segments = self.data_command("AGTListState", Vec::new()).await?;
        let [segment] = segments.as_slice() else {
            return Err(ClientError::InvalidPayload(format!(
                "AGTListState returned {} segments, expected 1",
                segments.len()
            )));
        };
        let (code, job_name) = match segment.split_once(',') {
            Some((code, job_name)) => (code, Some(job_name.to_owned())),
            None => (segment.as_str(), None),
        };
        Ok(AgentState {
            code: code.to_owned(),
            job_name,
        })
    }

    // ------------------------------------------------------------------
    // Work loop
    // ------------------------------------------------------------------

    /// Declare the agent available for calls.
    pub async fn avail_work(&self) -> Result<(), ClientError> {
        self.simple_command("AGTAvailWork", Vec::new()).await
    }

    /// Declare the agent unavailable after the current item.
    pub async fn no_further_work(&self) -> Result<(), ClientError> {
        self.simple_command("AGTNoFurtherWork", Vec::new()).await
    }

    /// Ask for the next work item.
    pub async fn ready_next_item(&self) -> Result<(), ClientError> {
        self.simple_command("AGTReadyNextItem", Vec::new()).await
    }

    /// Release the current line.
    pub async fn release_line(&self) -> Result<(), ClientError> {
        self.simple_command("AGTReleaseLine", Vec::new()).await
    }

    /// Finish the current item with a completion code.
    pub async fn finished_item(&self, completion_code: u32) -> Result<(), ClientError> {
        self.simple_command("AGTFinishedItem", vec![completion_code.to_string()])
            .await
    }

    // ------------------------------------------------------------------
    // Field access
    // ------------------------------------------------------------------

    /// Read one field of the current customer record.
    pub async fn read_field(
        &self,
        list_type: ListType,
        field_name: &str,
    ) -> Result<FieldValue, ClientError> {
        let segments = self
            .data_command(
                "AGTReadField",
                vec![list_type.as_char().to_string(), field_name.to_owned()],
            )
            .await?;
        let [segment] = segments.as_slice() else {
            return Err(ClientError::InvalidPayload(format!(
                "AGTReadField returned {} segments, expected 1",
                segments.len()
            )));
        };
        parse_field_value(segment)
    }
}

fn parse_job(segment: &str) -> Option<Job> {
    let parts: Vec<&str> = segment.split(',').collect();
    if parts.len() != 3 {
        return None;
    }
    Some(Job {
        job_type: JobType::from_char(parts[0].chars().next()?)?,
        name: parts[1].to_owned(),
        status: JobStatus::from_char(parts[2].chars().next()?)?,
    })
}

fn parse_field_value(segment: &str) -> Result<FieldValue, ClientError> {
    // The value itself may contain commas; only the first three are
    // structural.
    let parts: Vec<&str> = segment.splitn(4, ',').collect();
    let [name, field_type, length, value] = parts.as_slice() else {
        return Err(ClientError::InvalidPayload(format!(
            "field tuple `{segment}` does not have 4 parts"
        )));
    };
    let length = length.parse().map_err(|_| {
        ClientError::InvalidPayload(format!("field length `{length}` is not a number"))
    })?;
    Ok(FieldValue {
        name: (*name).to_owned(),
        field_type: (*field_type).to_owned(),
        length,
        value: (*value).to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_tuples_parse_and_malformed_are_skipped() {
        assert_eq!(
            parse_job("A,JOB_A,A"),
            Some(Job {
                job_type: JobType::All,
                name: "JOB_A".into(),
                status: JobStatus::Active,
            })
        );
        assert_eq!(parse_job("O,JOB_B,I").unwrap().status, JobStatus::Inactive);
        assert_eq!(parse_job("A,JOB_A"), None);
        assert_eq!(parse_job("A,JOB_A,A,extra"), None);
        assert_eq!(parse_job("X,JOB_A,A"), None);
        assert_eq!(parse_job(",JOB_A,A"), None);
    }

    #[test]
    fn field_tuples_keep_commas_in_the_value() {
        let field = parse_field_value("FIO,C,30,Doe,John").unwrap();
        assert_eq!(field.name, "FIO");
        assert_eq!(field.field_type, "C");
        assert_eq!(field.length, 30);
        assert_eq!(field.value, "Doe,John");
    }

    #[test]
    fn field_tuples_reject_bad_shapes() {
        assert!(matches!(
            parse_field_value("FIO,C,30"),
            Err(ClientError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_field_value("FIO,C,thirty,x"),
            Err(ClientError::InvalidPayload(_))
        ));
    }
}
