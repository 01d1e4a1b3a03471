use chrono::{DateTime, Utc};

use crate::{
    error::CaptureError,
    inference::InferenceResponse,
    models::{Emotion, TickResult},
};

/// Base score for labels outside the known table.
const UNKNOWN_EMOTION_BASE: f64 = 0.5;

pub fn base_score(emotion: &Emotion) -> f64 {
    match emotion {
        Emotion::Happy => 0.8,
        Emotion::Surprise => 0.9,
        Emotion::Neutral => 0.7,
        Emotion::Fear => 0.6,
        Emotion::Angry => 0.5,
        Emotion::Sad => 0.4,
        Emotion::Disgust => 0.3,
        Emotion::Other(_) => UNKNOWN_EMOTION_BASE,
    }
}

/// `base(emotion) * confidence`, clamped to `[0, 1]`.
pub fn attention_score(emotion: &Emotion, confidence: f64) -> f64 {
    (base_score(emotion) * confidence).clamp(0.0, 1.0)
}

/// Turn a raw inference response into a tick, or explain why this tick
/// carries no usable signal. With several faces the first one wins.
pub fn normalize(
    response: InferenceResponse,
    captured_at: DateTime<Utc>,
) -> Result<TickResult, CaptureError> {
    if !response.success {
        let message = response
            .message
            .unwrap_or_else(|| "service reported failure".to_string());
        if message.to_ascii_lowercase().contains("no face") {
            return Err(CaptureError::NoFace);
        }
        return Err(CaptureError::Rejected(message));
    }

    let (label, confidence, face_count) = match response.predictions {
        Some(predictions) if !predictions.is_empty() => {
            let face_count = predictions.len();
            let first = predictions
                .into_iter()
                .next()
                .ok_or(CaptureError::NoFace)?;
            (first.emotion, first.confidence, face_count)
        }
        Some(_) if response.emotion.is_none() => return Err(CaptureError::NoFace),
        _ => {
            let label = response
                .emotion
                .ok_or_else(|| CaptureError::Malformed("missing emotion".into()))?;
            let confidence = response
                .confidence
                .ok_or_else(|| CaptureError::Malformed("missing confidence".into()))?;
            (label, confidence, 1)
        }
    };

    if label.trim().is_empty() {
        return Err(CaptureError::Malformed("empty emotion label".into()));
    }
    if !confidence.is_finite() {
        return Err(CaptureError::Malformed(format!(
            "non-finite confidence {confidence}"
        )));
    }

    let emotion = Emotion::parse(&label);
    let attention_score = attention_score(&emotion, confidence);

    Ok(TickResult {
        emotion,
        confidence,
        attention_score,
        face_count,
        captured_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::FacePrediction;

    fn prediction(emotion: &str, confidence: f64) -> FacePrediction {
        FacePrediction {
            emotion: emotion.into(),
            confidence,
            ..Default::default()
        }
    }

    #[test]
    fn score_is_base_times_confidence() {
        assert!((attention_score(&Emotion::Happy, 0.5) - 0.4).abs() < 1e-9);
        assert!((attention_score(&Emotion::Disgust, 1.0) - 0.3).abs() < 1e-9);
        assert!((attention_score(&Emotion::Other("bored".into()), 1.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(attention_score(&Emotion::Surprise, 3.0), 1.0);
        assert_eq!(attention_score(&Emotion::Neutral, -1.0), 0.0);
    }

    #[test]
    fn first_face_wins() {
        let response = InferenceResponse {
            success: true,
            predictions: Some(vec![prediction("sad", 0.9), prediction("happy", 0.99)]),
            ..Default::default()
        };

        let tick = normalize(response, Utc::now()).unwrap();

        assert_eq!(tick.emotion, Emotion::Sad);
        assert_eq!(tick.face_count, 2);
        assert!((tick.attention_score - 0.36).abs() < 1e-9);
    }

    #[test]
    fn single_face_fields_are_used() {
        let response = InferenceResponse {
            success: true,
            emotion: Some("Neutral".into()),
            confidence: Some(1.0),
            ..Default::default()
        };

        let tick = normalize(response, Utc::now()).unwrap();

        assert_eq!(tick.emotion, Emotion::Neutral);
        assert_eq!(tick.face_count, 1);
        assert!((tick.attention_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn empty_predictions_mean_no_face() {
        let response = InferenceResponse {
            success: true,
            predictions: Some(vec![]),
            ..Default::default()
        };

        assert_eq!(normalize(response, Utc::now()), Err(CaptureError::NoFace));
    }

    #[test]
    fn failure_responses_carry_no_signal() {
        let no_face = InferenceResponse {
            success: false,
            message: Some("No face detected in image".into()),
            ..Default::default()
        };
        let rejected = InferenceResponse {
            success: false,
            message: Some("model warming up".into()),
            ..Default::default()
        };

        assert_eq!(normalize(no_face, Utc::now()), Err(CaptureError::NoFace));
        assert_eq!(
            normalize(rejected, Utc::now()),
            Err(CaptureError::Rejected("model warming up".into()))
        );
    }

    #[test]
    fn missing_fields_are_malformed() {
        let response = InferenceResponse {
            success: true,
            emotion: Some("happy".into()),
            ..Default::default()
        };

        assert!(matches!(
            normalize(response, Utc::now()),
            Err(CaptureError::Malformed(_))
        ));

        let nan = InferenceResponse {
            success: true,
            emotion: Some("happy".into()),
            confidence: Some(f64::NAN),
            ..Default::default()
        };
        assert!(matches!(
            normalize(nan, Utc::now()),
            Err(CaptureError::Malformed(_))
        ));
    }
}
