use blockplane_domain::{codes, BlockReply};
use serde_json::{json, Value};

use crate::error::EngineError;

pub const DEFAULT_ERR_MSG: &str =
    "Operation failed, please check the log file to find the reason.";

/// Which command a response belongs to; only `Info` renders errors
/// differently (no trailing RESULT line in plain mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Delete,
    Modify,
    Replace,
    List,
    Info,
}

// ── Error rendering ───────────────────────────────────────────────────────────

pub fn error_reply(op: Op, json_resp: bool, err_code: i32, err_msg: &str) -> BlockReply {
    let err_code = if err_code <= 0 { codes::DEFAULT_ERR } else { err_code };
    let out = if json_resp {
        render_json(&json!({
            "RESULT": "FAIL",
            "errCode": err_code,
            "errMsg": err_msg,
        }))
    } else if op == Op::Info {
        format!("{err_msg}\n")
    } else {
        format!("{err_msg}\nRESULT: FAIL\n")
    };
    BlockReply { exit: err_code, out }
}

pub fn engine_error_reply(op: Op, json_resp: bool, err: &EngineError) -> BlockReply {
    error_reply(op, json_resp, err.err_code(), &err.to_string())
}

fn render_json(value: &Value) -> String {
    // The renderer must never fail silently; a serialization failure falls
    // back to the canned error object.
    match serde_json::to_string_pretty(value) {
        Ok(text) => format!("{text}\n"),
        Err(_) => format!(
            "{{ \"RESULT\": \"FAIL\", \"errCode\": {}, \"errMsg\": \"{}\" }}\n",
            codes::DEFAULT_ERR,
            DEFAULT_ERR_MSG
        ),
    }
}

fn hosts_or(hosts: &[String], fallback: &str) -> String {
    if hosts.is_empty() {
        fallback.to_string()
    } else {
        hosts.join(" ")
    }
}

fn result_token(err_code: i32) -> &'static str {
    if err_code == 0 {
        "SUCCESS"
    } else {
        "FAIL"
    }
}

// ── Size formatting ───────────────────────────────────────────────────────────

const SIZE_UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Render a byte count the way operators read it (`1.0 GiB`).
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", SIZE_UNITS[unit])
    }
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CreateSummary {
    pub iqn: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub portals: Vec<String>,
    /// Hosts a compensating delete was (or still must be) run on.
    pub rollback: Vec<String>,
    pub err_code: i32,
}

impl CreateSummary {
    pub fn into_reply(self, json_resp: bool) -> BlockReply {
        let out = if json_resp {
            let mut obj = json!({
                "IQN": self.iqn.clone().unwrap_or_default(),
                "PORTAL(S)": self.portals,
            });
            if let (Some(user), Some(pass)) = (&self.username, &self.password) {
                obj["USERNAME"] = json!(user);
                obj["PASSWORD"] = json!(pass);
            }
            if !self.rollback.is_empty() {
                obj["ROLLBACK ON"] = json!(self.rollback);
            }
            obj["RESULT"] = json!(result_token(self.err_code));
            render_json(&obj)
        } else {
            let mut out = format!("IQN: {}\n", self.iqn.as_deref().unwrap_or("-"));
            if let (Some(user), Some(pass)) = (&self.username, &self.password) {
                out.push_str(&format!("USERNAME: {user}\nPASSWORD: {pass}\n"));
            }
            out.push_str(&format!("PORTAL(S): {}\n", hosts_or(&self.portals, "-")));
            if !self.rollback.is_empty() {
                out.push_str(&format!("ROLLBACK ON: {}\n", self.rollback.join(" ")));
            }
            out.push_str(&format!("RESULT: {}\n", result_token(self.err_code)));
            out
        };
        BlockReply { exit: self.err_code, out }
    }
}

// ── Delete ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DeleteSummary {
    pub attempted: Vec<String>,
    pub succeeded: Vec<String>,
    pub err_code: i32,
}

impl DeleteSummary {
    pub fn into_reply(self, json_resp: bool) -> BlockReply {
        let out = if json_resp {
            render_json(&json!({
                "FAILED ON": self.attempted,
                "SUCCESSFUL ON": self.succeeded,
                "RESULT": result_token(self.err_code),
            }))
        } else {
            let mut out = String::new();
            if !self.attempted.is_empty() {
                out.push_str(&format!("FAILED ON: {}\n", self.attempted.join(" ")));
            }
            out.push_str(&format!(
                "SUCCESSFUL ON: {}\nRESULT: {}\n",
                hosts_or(&self.succeeded, "None"),
                result_token(self.err_code)
            ));
            out
        };
        BlockReply { exit: self.err_code, out }
    }
}

// ── Modify ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ModifySummary {
    pub iqn: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub attempted: Vec<String>,
    pub succeeded: Vec<String>,
    pub rb_attempted: Vec<String>,
    pub rb_succeeded: Vec<String>,
    pub rolled_back: bool,
    pub err_code: i32,
}

impl ModifySummary {
    pub fn into_reply(self, json_resp: bool) -> BlockReply {
        let out = if json_resp {
            let mut obj = json!({ "IQN": self.iqn });
            if let (Some(user), Some(pass)) = (&self.username, &self.password) {
                obj["USERNAME"] = json!(user);
                obj["PASSWORD"] = json!(pass);
            }
            if !self.attempted.is_empty() {
                obj["FAILED ON"] = json!(self.attempted);
            }
            if !self.succeeded.is_empty() {
                obj["SUCCESSFUL ON"] = json!(self.succeeded);
            }
            if self.rolled_back {
                if !self.rb_attempted.is_empty() {
                    obj["ROLLBACK FAILED ON"] = json!(self.rb_attempted);
                }
                if !self.rb_succeeded.is_empty() {
                    obj["ROLLBACK SUCCESS ON"] = json!(self.rb_succeeded);
                }
            }
            obj["RESULT"] = json!(result_token(self.err_code));
            render_json(&obj)
        } else {
            let mut out = format!("IQN: {}\n", self.iqn);
            if let (Some(user), Some(pass)) = (&self.username, &self.password) {
                out.push_str(&format!("USERNAME: {user}\nPASSWORD: {pass}\n"));
            }
            if !self.attempted.is_empty() {
                out.push_str(&format!("FAILED ON: {}\n", self.attempted.join(" ")));
            }
            if !self.succeeded.is_empty() {
                out.push_str(&format!("SUCCESSFUL ON: {}\n", self.succeeded.join(" ")));
            }
            if self.rolled_back {
                if !self.rb_attempted.is_empty() {
                    out.push_str(&format!(
                        "ROLLBACK FAILED ON: {}\n",
                        self.rb_attempted.join(" ")
                    ));
                }
                if !self.rb_succeeded.is_empty() {
                    out.push_str(&format!(
                        "ROLLBACK SUCCESS ON: {}\n",
                        self.rb_succeeded.join(" ")
                    ));
                }
            }
            out.push_str(&format!("RESULT: {}\n", result_token(self.err_code)));
            out
        };
        BlockReply { exit: self.err_code, out }
    }
}

// ── Replace ───────────────────────────────────────────────────────────────────

/// One of replace's three concurrent sub-operations.
#[derive(Debug, Clone)]
pub enum SubOp {
    /// Bypassed because its effect was already in place.
    Skipped { hosts: Vec<String> },
    /// Ran; `attempted` holds the failures.
    Done { attempted: Vec<String>, succeeded: Vec<String> },
    /// Nothing to do on a single-path block (no other portals to swap).
    NotApplicable,
}

impl SubOp {
    fn ok(&self, masked: bool) -> bool {
        match self {
            SubOp::Skipped { .. } | SubOp::NotApplicable => true,
            SubOp::Done { attempted, .. } => masked || attempted.is_empty(),
        }
    }
}

#[derive(Debug)]
pub struct ReplaceSummary {
    pub name: String,
    /// Every sub-op was skipped: the whole command is an idempotent no-op.
    pub all_skipped: bool,
    /// Force masks delete failures in the reported result.
    pub force: bool,
    pub create: SubOp,
    pub delete: SubOp,
    pub replace: SubOp,
}

impl ReplaceSummary {
    pub fn succeeded(&self) -> bool {
        self.create.ok(false) && self.delete.ok(self.force) && self.replace.ok(false)
    }

    fn exit_code(&self) -> i32 {
        if self.all_skipped {
            codes::OP_SKIPPED
        } else if self.succeeded() {
            0
        } else {
            codes::DEFAULT_ERR
        }
    }

    pub fn into_reply(self, json_resp: bool) -> BlockReply {
        let exit = self.exit_code();
        let out = if json_resp {
            let mut obj = json!({ "NAME": self.name });
            if self.all_skipped {
                obj["RESULT"] = json!("SKIPPED");
            } else {
                match &self.create {
                    SubOp::Skipped { hosts } => obj["CREATE SKIPPED"] = json!(hosts.join(" ")),
                    SubOp::Done { attempted, succeeded } => {
                        if attempted.is_empty() {
                            obj["CREATE SUCCESS"] = json!(succeeded.join(" "));
                        } else {
                            obj["CREATE FAILED"] = json!(attempted.join(" "));
                        }
                    }
                    SubOp::NotApplicable => {}
                }
                match &self.delete {
                    SubOp::Skipped { hosts } => obj["DELETE SKIPPED"] = json!(hosts.join(" ")),
                    SubOp::Done { attempted, succeeded } => {
                        if attempted.is_empty() {
                            obj["DELETE SUCCESS"] = json!(succeeded.join(" "));
                        } else if self.force {
                            obj["DELETE FAILED (ignored)"] = json!(attempted.join(" "));
                        } else {
                            obj["DELETE FAILED"] = json!(attempted.join(" "));
                        }
                    }
                    SubOp::NotApplicable => {}
                }
                match &self.replace {
                    SubOp::Skipped { hosts } => {
                        obj["REPLACE PORTAL SKIPPED ON"] = json!(hosts);
                    }
                    SubOp::Done { attempted, succeeded } => {
                        if !attempted.is_empty() {
                            obj["REPLACE PORTAL FAILED ON"] = json!(attempted);
                        }
                        if !succeeded.is_empty() {
                            obj["REPLACE PORTAL SUCCESS ON"] = json!(succeeded);
                        }
                    }
                    SubOp::NotApplicable => {
                        obj["REPLACE PORTAL SUCCESS ON"] = json!(["N/A"]);
                    }
                }
                obj["RESULT"] = json!(if exit == 0 { "SUCCESS" } else { "FAIL" });
            }
            render_json(&obj)
        } else {
            let mut out = format!("NAME: {}\n", self.name);
            if self.all_skipped {
                out.push_str("RESULT: SKIPPED\n");
            } else {
                match &self.create {
                    SubOp::Skipped { hosts } => {
                        out.push_str(&format!("CREATE SKIPPED: {}\n", hosts.join(" ")))
                    }
                    SubOp::Done { attempted, succeeded } => {
                        if attempted.is_empty() {
                            out.push_str(&format!("CREATE SUCCESS: {}\n", succeeded.join(" ")));
                        } else {
                            out.push_str(&format!("CREATE FAILED: {}\n", attempted.join(" ")));
                        }
                    }
                    SubOp::NotApplicable => {}
                }
                match &self.delete {
                    SubOp::Skipped { hosts } => {
                        out.push_str(&format!("DELETE SKIPPED: {}\n", hosts.join(" ")))
                    }
                    SubOp::Done { attempted, succeeded } => {
                        if attempted.is_empty() {
                            out.push_str(&format!("DELETE SUCCESS: {}\n", succeeded.join(" ")));
                        } else if self.force {
                            out.push_str(&format!(
                                "DELETE FAILED (ignored): {}\n",
                                attempted.join(" ")
                            ));
                        } else {
                            out.push_str(&format!("DELETE FAILED: {}\n", attempted.join(" ")));
                        }
                    }
                    SubOp::NotApplicable => {}
                }
                match &self.replace {
                    SubOp::Skipped { hosts } => out.push_str(&format!(
                        "REPLACE PORTAL SKIPPED ON: {}\n",
                        hosts.join(" ")
                    )),
                    SubOp::Done { attempted, succeeded } => {
                        if !attempted.is_empty() {
                            out.push_str(&format!(
                                "REPLACE PORTAL FAILED ON: {}\n",
                                attempted.join(" ")
                            ));
                        }
                        if !succeeded.is_empty() {
                            out.push_str(&format!(
                                "REPLACE PORTAL SUCCESS ON: {}\n",
                                succeeded.join(" ")
                            ));
                        }
                    }
                    SubOp::NotApplicable => {
                        out.push_str("REPLACE PORTAL SUCCESS ON: N/A\n");
                    }
                }
                out.push_str(&format!(
                    "RESULT: {}\n",
                    if exit == 0 { "SUCCESS" } else { "FAIL" }
                ));
            }
            out
        };
        BlockReply { exit, out }
    }
}

// ── List / Info ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ListSummary {
    pub blocks: Vec<String>,
}

impl ListSummary {
    pub fn into_reply(self, json_resp: bool) -> BlockReply {
        let out = if json_resp {
            render_json(&json!({
                "blocks": self.blocks,
                "RESULT": "SUCCESS",
            }))
        } else if self.blocks.is_empty() {
            "*Nil*\n".to_string()
        } else {
            let mut out = String::new();
            for block in &self.blocks {
                out.push_str(block);
                out.push('\n');
            }
            out
        };
        BlockReply { exit: 0, out }
    }
}

#[derive(Debug)]
pub struct InfoSummary {
    pub name: String,
    pub volume: String,
    pub gbid: String,
    pub size: u64,
    pub mpath: u32,
    pub passwd: String,
    pub exported: Vec<String>,
}

impl InfoSummary {
    pub fn into_reply(self, json_resp: bool) -> BlockReply {
        let out = if json_resp {
            render_json(&json!({
                "NAME": self.name,
                "VOLUME": self.volume,
                "GBID": self.gbid,
                "SIZE": format_size(self.size),
                "HA": self.mpath,
                "PASSWORD": self.passwd,
                "EXPORTED NODE(S)": self.exported,
            }))
        } else {
            format!(
                "NAME: {}\nVOLUME: {}\nGBID: {}\nSIZE: {}\nHA: {}\nPASSWORD: {}\nEXPORTED NODE(S): {}\n",
                self.name,
                self.volume,
                self.gbid,
                format_size(self.size),
                self.mpath,
                self.passwd,
                self.exported.join(" ")
            )
        };
        BlockReply { exit: 0, out }
    }
}
