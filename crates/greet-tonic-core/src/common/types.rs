//! Protocol constants shared by greet clients and servers.

/// The exact number of responses a `GreetManyTimes` call produces.
///
/// Part of the wire contract: clients may rely on receiving exactly this many
/// messages, in no particular order, before the stream closes.
pub const FAN_OUT_RESPONSES: usize = 5;
