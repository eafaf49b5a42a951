pub(super) fn init_metrics() {
    describe_process();
    describe_upload();
}

fn describe_process() {
    metrics::describe_counter!(
        PROCESS_START,
        "How many times reelhost has spawned a background process"
    );
    metrics::describe_histogram!(
        PROCESS_DURATION,
        "Timings for all background processes"
    );
    metrics::describe_counter!(
        PROCESS_END,
        "How many background processes have completed"
    );
}

pub(crate) const PROCESS_START: &str = "reelhost.process.start";
pub(crate) const PROCESS_DURATION: &str = "reelhost.process.duration";
pub(crate) const PROCESS_END: &str = "reelhost.process.end";

fn describe_upload() {
    metrics::describe_counter!(
        UPLOADS,
        "How many videos have been stored, labelled by orientation"
    );
    metrics::describe_histogram!(
        UPLOAD_DURATION,
        "Timings for processing an upload from first byte to public url"
    );
}

pub(crate) const UPLOADS: &str = "reelhost.uploads";
pub(crate) const UPLOAD_DURATION: &str = "reelhost.upload.duration";
