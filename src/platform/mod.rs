//=========================================================================
// Platform
//=========================================================================
//
// Identification of the operating system the context runs on.
//
//=========================================================================

mod detect;

pub use detect::Platform;
