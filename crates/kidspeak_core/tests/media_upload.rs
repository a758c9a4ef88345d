use kidspeak_core::db::open_db_in_memory;
use kidspeak_core::media::CaptureStream;
use kidspeak_core::storage::fetch_url;
use kidspeak_core::{
    AssetBucket, AudioRecorder, ChildService, CoreError, FsObjectStorage, Gender, MediaUploader,
    MemoryDraft, MemoryService, Microphone, ObjectStorage, SessionContext, SqliteChildRepository,
    SqliteMemoryRepository, UserId, ValidationError,
};
use std::collections::VecDeque;
use std::sync::Arc;

struct ScriptedMicrophone {
    chunks: Vec<Vec<u8>>,
    granted: bool,
}

struct ScriptedStream {
    chunks: VecDeque<Vec<u8>>,
}

impl CaptureStream for ScriptedStream {
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.chunks.pop_front()
    }

    fn release(&mut self) {
        self.chunks.clear();
    }
}

impl Microphone for ScriptedMicrophone {
    fn acquire(&self) -> Result<Box<dyn CaptureStream>, String> {
        if !self.granted {
            return Err("permission denied by user".to_string());
        }
        Ok(Box::new(ScriptedStream {
            chunks: self.chunks.iter().cloned().collect(),
        }))
    }
}

fn session(user: &str) -> SessionContext {
    SessionContext::signed_in(UserId::parse(user).unwrap())
}

#[test]
fn uploads_are_namespaced_by_owner_and_resolvable() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn ObjectStorage> =
        Arc::new(FsObjectStorage::open(dir.path(), "https://cdn.test").unwrap());
    let uploader = MediaUploader::new(Arc::clone(&storage));

    let photo = uploader
        .upload_photo(&session("parent a@home"), b"jpeg-bytes", "JPEG")
        .unwrap();
    assert_eq!(photo.bucket, AssetBucket::Photos);
    assert!(photo.path.starts_with("parent_a_home/"));
    assert!(photo.path.ends_with(".jpeg"));
    assert_eq!(
        fetch_url(storage.as_ref(), &photo.resolved_url).unwrap(),
        b"jpeg-bytes".to_vec()
    );

    let voice = uploader
        .upload_audio(&session("parent-a"), b"webm-bytes")
        .unwrap();
    assert_eq!(voice.bucket, AssetBucket::Voices);
    assert!(voice.resolved_url.starts_with("https://cdn.test/voices/parent-a/"));
    assert!(voice.path.ends_with(".webm"));

    let second = uploader
        .upload_audio(&session("parent-a"), b"webm-bytes")
        .unwrap();
    assert_ne!(second.path, voice.path);
}

#[test]
fn uploads_require_session_and_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let uploader = MediaUploader::new(Arc::new(
        FsObjectStorage::open(dir.path(), "https://cdn.test").unwrap(),
    ));

    let err = uploader
        .upload_photo(&SessionContext::anonymous(), b"x", "jpg")
        .unwrap_err();
    assert!(matches!(err, CoreError::Unauthenticated));

    let err = uploader
        .upload_audio(&session("parent-a"), &[])
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::EmptyMedia(AssetBucket::Voices))
    ));
}

#[test]
fn recorded_voice_flows_into_a_memory() {
    let conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn ObjectStorage> =
        Arc::new(FsObjectStorage::open(dir.path(), "https://cdn.test").unwrap());
    let service = MemoryService::new(
        SqliteChildRepository::try_new(&conn).unwrap(),
        SqliteMemoryRepository::try_new(&conn).unwrap(),
        MediaUploader::new(Arc::clone(&storage)),
    );
    let child = ChildService::new(SqliteChildRepository::try_new(&conn).unwrap())
        .add_child(&session("parent-a"), "Phoebe", Gender::Girl)
        .unwrap();

    let recorder = AudioRecorder::new(Box::new(ScriptedMicrophone {
        chunks: vec![b"ab".to_vec(), Vec::new(), b"cd".to_vec()],
        granted: true,
    }));
    let mut recording = recorder.start().unwrap();
    assert_eq!(recording.capture(), 2);
    let blob = recording.stop();
    assert_eq!(blob.bytes, b"abcd".to_vec());
    assert_eq!(blob.mime_type, "audio/webm");

    let mut draft = MemoryDraft::text_only(child.id, "Isha", "Fish");
    draft.audio = Some(blob);
    let entry = service.submit_memory(&session("parent-a"), &draft).unwrap();
    let audio = entry.audio_ref.expect("voice asset");
    assert_eq!(
        fetch_url(storage.as_ref(), &audio.resolved_url).unwrap(),
        b"abcd".to_vec()
    );
}

#[test]
fn denied_microphone_is_capability_denied() {
    let recorder = AudioRecorder::new(Box::new(ScriptedMicrophone {
        chunks: Vec::new(),
        granted: false,
    }));
    let err = recorder.start().err().expect("start should fail");
    assert_eq!(err.code(), "capability_denied");
}
