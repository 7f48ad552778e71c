#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok = 200,

    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,

    InternalServerError = 500,
}

impl HttpStatus {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn reason(self) -> &'static str {
        match self {
            HttpStatus::Ok => "OK",                                       // 200
            HttpStatus::Forbidden => "Forbidden",                         // 403
            HttpStatus::NotFound => "Not Found",                          // 404
            HttpStatus::MethodNotAllowed => "Method Not Allowed",         // 405
            HttpStatus::InternalServerError => "Internal Server Error",   // 500
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(HttpStatus::NotFound.as_u16(), 404);
        assert_eq!(HttpStatus::MethodNotAllowed.reason(), "Method Not Allowed");
    }
}
