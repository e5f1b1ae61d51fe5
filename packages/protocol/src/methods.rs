// ABOUTME: RPC method names served inside a bridge container

pub const INITIALIZE: &str = "initialize";
pub const PING: &str = "ping";

pub const GIT_CLONE: &str = "git/clone";

pub const FS_READ: &str = "fs/read";
pub const FS_WRITE: &str = "fs/write";
pub const FS_LIST: &str = "fs/list";
pub const FS_EXISTS: &str = "fs/exists";
pub const FS_STAT: &str = "fs/stat";

pub const EXEC_RUN: &str = "exec/run";

pub const BRIDGE_HEALTH: &str = "bridge/health";
pub const BRIDGE_LOGS: &str = "bridge/logs";

/// Notifications never receive a response
pub const NOTIFICATION_PREFIX: &str = "notifications/";
