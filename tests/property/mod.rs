mod fingerprint;
mod redaction;
