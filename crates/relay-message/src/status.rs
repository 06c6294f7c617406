//! HTTP status codes
//!
//! A closed table: codes outside of it are rejected instead of being
//! carried around with an "Unknown" phrase.

use crate::{Error, Result};

macro_rules! status_table {
    ($($(#[$doc:meta])* $variant:ident = $code:literal, $phrase:literal;)+) => {
        /// HTTP Status
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Status {
            $($(#[$doc])* $variant = $code,)+
        }

        impl Status {
            /// Every status in the table, in ascending order
            pub const ALL: &'static [Status] = &[$(Status::$variant,)+];

            /// Look up a status by numeric code
            pub fn from_code(code: u16) -> Result<Self> {
                match code {
                    $($code => Ok(Status::$variant),)+
                    _ => Err(Error::InvalidStatus(code)),
                }
            }

            /// Canonical reason phrase
            pub fn reason_phrase(&self) -> &'static str {
                match self {
                    $(Status::$variant => $phrase,)+
                }
            }
        }
    };
}

status_table! {
    // 1xx Informational
    Continue = 100, "Continue";
    SwitchingProtocols = 101, "Switching Protocols";
    Processing = 102, "Processing";

    // 2xx Success
    Ok = 200, "OK";
    Created = 201, "Created";
    Accepted = 202, "Accepted";
    NonAuthoritativeInformation = 203, "Non-Authoritative Information";
    NoContent = 204, "No Content";
    ResetContent = 205, "Reset Content";
    PartialContent = 206, "Partial Content";
    MultiStatus = 207, "Multi-Status";
    AlreadyReported = 208, "Already Reported";
    ImUsed = 226, "IM Used";

    // 3xx Redirection
    MultipleChoices = 300, "Multiple Choices";
    MovedPermanently = 301, "Moved Permanently";
    Found = 302, "Found";
    SeeOther = 303, "See Other";
    NotModified = 304, "Not Modified";
    UseProxy = 305, "Use Proxy";
    SwitchProxy = 306, "Switch Proxy";
    TemporaryRedirect = 307, "Temporary Redirect";
    PermanentRedirect = 308, "Permanent Redirect";

    // 4xx Client Errors
    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    PaymentRequired = 402, "Payment Required";
    Forbidden = 403, "Forbidden";
    NotFound = 404, "Not Found";
    MethodNotAllowed = 405, "Method Not Allowed";
    NotAcceptable = 406, "Not Acceptable";
    ProxyAuthenticationRequired = 407, "Proxy Authentication Required";
    RequestTimeout = 408, "Request Time-out";
    Conflict = 409, "Conflict";
    Gone = 410, "Gone";
    LengthRequired = 411, "Length Required";
    PreconditionFailed = 412, "Precondition Failed";
    PayloadTooLarge = 413, "Request Entity Too Large";
    UriTooLong = 414, "Request-URI Too Large";
    UnsupportedMediaType = 415, "Unsupported Media Type";
    RangeNotSatisfiable = 416, "Requested range not satisfiable";
    ExpectationFailed = 417, "Expectation Failed";
    ImATeapot = 418, "I'm a teapot";
    MisdirectedRequest = 421, "Misdirected Request";
    UnprocessableEntity = 422, "Unprocessable Entity";
    Locked = 423, "Locked";
    FailedDependency = 424, "Failed Dependency";
    UnorderedCollection = 425, "Unordered Collection";
    UpgradeRequired = 426, "Upgrade Required";
    PreconditionRequired = 428, "Precondition Required";
    TooManyRequests = 429, "Too Many Requests";
    RequestHeaderFieldsTooLarge = 431, "Request Header Fields Too Large";
    UnavailableForLegalReasons = 451, "Unavailable For Legal Reasons";

    // 5xx Server Errors
    InternalServerError = 500, "Internal Server Error";
    NotImplemented = 501, "Not Implemented";
    BadGateway = 502, "Bad Gateway";
    ServiceUnavailable = 503, "Service Unavailable";
    GatewayTimeout = 504, "Gateway Time-out";
    HttpVersionNotSupported = 505, "HTTP Version not supported";
    VariantAlsoNegotiates = 506, "Variant Also Negotiates";
    InsufficientStorage = 507, "Insufficient Storage";
    LoopDetected = 508, "Loop Detected";
    NotExtended = 510, "Not Extended";
    NetworkAuthenticationRequired = 511, "Network Authentication Required";
}

impl Status {
    /// Get the numeric code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is an informational status (1xx)
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.code())
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code())
    }

    /// Check if this is a redirect status (3xx)
    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.code())
    }

    /// Check if this is a client error status (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code())
    }

    /// Check if this is a server error status (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.code())
    }
}

impl TryFrom<u16> for Status {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self> {
        Status::from_code(code)
    }
}

impl From<Status> for u16 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl From<Status> for http::StatusCode {
    fn from(status: Status) -> Self {
        // every code in the table is within 100..=999
        http::StatusCode::from_u16(status.code()).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Ok
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason_phrase())
    }
}
