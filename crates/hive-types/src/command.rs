//! Closed command vocabularies for the session and its pages.
//!
//! Both endpoints dispatch on these enums instead of looking operations up
//! by name; a name that maps to neither is unknown and gets dropped.

use std::fmt;

/// Commands addressed to the session itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionCommand {
    CreatePage,
    InjectJs,
    AddCookie,
    DeleteCookie,
    ClearCookies,
    Get,
    Set,
    Exit,
    Done,
}

impl SessionCommand {
    pub const ALL: [SessionCommand; 9] = [
        SessionCommand::CreatePage,
        SessionCommand::InjectJs,
        SessionCommand::AddCookie,
        SessionCommand::DeleteCookie,
        SessionCommand::ClearCookies,
        SessionCommand::Get,
        SessionCommand::Set,
        SessionCommand::Exit,
        SessionCommand::Done,
    ];

    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionCommand::CreatePage => "createPage",
            SessionCommand::InjectJs => "injectJs",
            SessionCommand::AddCookie => "addCookie",
            SessionCommand::DeleteCookie => "deleteCookie",
            SessionCommand::ClearCookies => "clearCookies",
            SessionCommand::Get => "get",
            SessionCommand::Set => "set",
            SessionCommand::Exit => "exit",
            SessionCommand::Done => "done",
        }
    }

    /// Look up a command by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands addressed to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageCommand {
    AddCookie,
    DeleteCookie,
    ClearCookies,
    Close,
    Release,
    Evaluate,
    EvaluateAsync,
    IncludeJs,
    InjectJs,
    Open,
    Render,
    RenderBase64,
    SendEvent,
    UploadFile,
    Get,
    Set,
}

impl PageCommand {
    pub const ALL: [PageCommand; 16] = [
        PageCommand::AddCookie,
        PageCommand::DeleteCookie,
        PageCommand::ClearCookies,
        PageCommand::Close,
        PageCommand::Release,
        PageCommand::Evaluate,
        PageCommand::EvaluateAsync,
        PageCommand::IncludeJs,
        PageCommand::InjectJs,
        PageCommand::Open,
        PageCommand::Render,
        PageCommand::RenderBase64,
        PageCommand::SendEvent,
        PageCommand::UploadFile,
        PageCommand::Get,
        PageCommand::Set,
    ];

    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            PageCommand::AddCookie => "addCookie",
            PageCommand::DeleteCookie => "deleteCookie",
            PageCommand::ClearCookies => "clearCookies",
            PageCommand::Close => "close",
            PageCommand::Release => "release",
            PageCommand::Evaluate => "evaluate",
            PageCommand::EvaluateAsync => "evaluateAsync",
            PageCommand::IncludeJs => "includeJs",
            PageCommand::InjectJs => "injectJs",
            PageCommand::Open => "open",
            PageCommand::Render => "render",
            PageCommand::RenderBase64 => "renderBase64",
            PageCommand::SendEvent => "sendEvent",
            PageCommand::UploadFile => "uploadFile",
            PageCommand::Get => "get",
            PageCommand::Set => "set",
        }
    }

    /// Look up a command by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for PageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_map_back_to_commands() {
        for cmd in SessionCommand::ALL {
            assert_eq!(SessionCommand::from_name(cmd.as_str()), Some(cmd));
        }
        for cmd in PageCommand::ALL {
            assert_eq!(PageCommand::from_name(cmd.as_str()), Some(cmd));
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(SessionCommand::from_name("open"), None);
        assert_eq!(PageCommand::from_name("createPage"), None);
        assert_eq!(PageCommand::from_name("Open"), None);
    }
}
